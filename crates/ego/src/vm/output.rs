//! Console output, logging, timers, templates and the REST helpers.

use std::{borrow::Cow, time::Instant};

use super::{AUTHENTICATED_VAR, Context, REST_RESPONSE_VAR, REST_STATUS_VAR, SUPERUSER_VAR, TOKEN_VALID_VAR};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    log::{self, LogCategory},
    symbols::ROOT_TABLE,
    value::{Value, to_json},
};

/// Replaces `{{.name}}` references with members of `data`; `{{.}}` is the
/// value itself.
fn render_template(template: &str, data: &Value) -> RunResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(EgoError::new(ErrorKind::InvalidTemplateName).context("unterminated action"));
        };
        let action = after[..close].trim();
        let Some(path) = action.strip_prefix('.') else {
            return Err(EgoError::new(ErrorKind::InvalidTemplateName).context(action));
        };
        let mut value = data.clone();
        for name in path.split('.').filter(|p| !p.is_empty()) {
            value = template_member(&value, name)?;
        }
        out.push_str(&value.to_string());
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn template_member(value: &Value, name: &str) -> RunResult<Value> {
    let member = match value.unwrapped() {
        Value::Struct(s) => s.get(name),
        Value::Map(m) => m.get(&Value::from(name))?,
        _ => None,
    };
    member.ok_or_else(|| EgoError::new(ErrorKind::UnknownMember).context(name))
}

impl Context {
    fn write(&mut self, text: String) -> RunResult<()> {
        self.output.write_str(Cow::Owned(text))
    }

    /// Pops n values (default one) and writes them space separated, in the
    /// order they were pushed.
    pub(super) fn op_print(&mut self, operand: &Value) -> RunResult<()> {
        let count = Self::operand_count(operand, 1)?;
        let values = self.pop_args(count)?;
        let text = values.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        self.write(text)
    }

    pub(super) fn op_say(&mut self, _operand: &Value) -> RunResult<()> {
        let v = self.pop_value()?;
        self.write(v.to_string())?;
        self.output.push_char('\n')
    }

    pub(super) fn op_newline(&mut self, _operand: &Value) -> RunResult<()> {
        self.output.push_char('\n')
    }

    /// Pops a value and logs it to the category named by the operand.
    pub(super) fn op_log(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let category: LogCategory = name
            .parse()
            .map_err(|_| EgoError::new(ErrorKind::InvalidLoggerName).context(name))?;
        let v = self.pop_value()?;
        if log::is_active(category) {
            log::emit(category, &v.to_string());
        }
        Ok(())
    }

    /// `Timer 0` starts a timer; `Timer 1` stops the newest one and pushes
    /// the elapsed time as text.
    pub(super) fn op_timer(&mut self, operand: &Value) -> RunResult<()> {
        match operand.as_int()? {
            0 => {
                self.timer_stack.push(Instant::now());
                Ok(())
            }
            1 => {
                let start = self
                    .timer_stack
                    .pop()
                    .ok_or_else(|| EgoError::new(ErrorKind::InvalidTimer).context("no timer running"))?;
                self.push(Value::String(format!("{:?}", start.elapsed())));
                Ok(())
            }
            other => Err(EgoError::new(ErrorKind::InvalidTimer).context(other)),
        }
    }

    /// Pops a value and pushes the template held in the operand symbol,
    /// rendered against it.
    pub(super) fn op_template(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let template = match self.arena.get(self.symbols, name).map(Value::into_unwrapped) {
            Some(Value::String(text)) => text,
            _ => return Err(EgoError::new(ErrorKind::InvalidTemplateName).context(name)),
        };
        let data = self.pop_value()?;
        let text = render_template(&template, &data)?;
        self.push(Value::String(text));
        Ok(())
    }

    /// Pops a value, writes its JSON form and keeps it for the REST layer.
    pub(super) fn op_response(&mut self, _operand: &Value) -> RunResult<()> {
        let v = self.pop_value()?.into_unwrapped();
        let text = serde_json::to_string(&to_json(&v))
            .map_err(|err| EgoError::new(ErrorKind::InvalidValue).context(err))?;
        self.write(text.clone())?;
        self.output.push_char('\n')?;
        self.arena.set_always(ROOT_TABLE, REST_RESPONSE_VAR, Value::String(text))
    }

    /// Checks the caller's credentials for `user`, `admin`, `token` or
    /// `tokenadmin` access. A failed check records 401 or 403 in
    /// `_rest_status` and stops the program.
    pub(super) fn op_auth(&mut self, operand: &Value) -> RunResult<()> {
        let kind = Self::operand_name(operand)?.to_ascii_lowercase();
        let flag = |name: &str| self.arena.get(self.symbols, name).is_some_and(|v| v.truthy());
        let (authenticated, superuser, token_valid) =
            (flag(AUTHENTICATED_VAR), flag(SUPERUSER_VAR), flag(TOKEN_VALID_VAR));
        let status = match kind.as_str() {
            "user" if !authenticated => Some(401),
            "admin" if !authenticated => Some(401),
            "admin" if !superuser => Some(403),
            "token" if !token_valid => Some(401),
            "tokenadmin" if !token_valid => Some(401),
            "tokenadmin" if !superuser => Some(403),
            "user" | "admin" | "token" | "tokenadmin" => None,
            _ => return Err(EgoError::new(ErrorKind::InvalidValue).context(kind)),
        };
        let Some(status) = status else {
            return Ok(());
        };
        log::emit(
            LogCategory::Rest,
            &EgoError::new(ErrorKind::NotAuthorized).context(format!("{kind} ({status})")).to_string(),
        );
        self.arena.set_always(ROOT_TABLE, REST_STATUS_VAR, Value::Int(status))?;
        Err(ErrorKind::Stop.into())
    }
}
