//! User form with live validation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use flare_live::{LiveView, Params, ViewContext, ViewError};
use flare_render::{RenderedNode, Renderable, Slot};
use serde_json::Value;

use super::{escape, node};

/// Topic the form is joined on.
pub const TOPIC: &str = "form";

/// Field values as last sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// Display name.
    pub name: String,
    /// Contact address.
    pub email: String,
}

/// Form state: current values, per-field errors and whether it was saved.
#[derive(Debug, Default)]
pub struct Form {
    user: User,
    errors: BTreeMap<&'static str, &'static str>,
    submitted: bool,
}

impl Form {
    /// Copy the fields present in `value` and recheck them. Returns whether
    /// the form is valid.
    fn validate(&mut self, value: &Value) -> bool {
        if let Some(name) = value.get("name").and_then(Value::as_str) {
            self.user.name = name.trim().to_owned();
        }
        if let Some(email) = value.get("email").and_then(Value::as_str) {
            self.user.email = email.trim().to_owned();
        }

        self.errors.clear();
        if self.user.name.is_empty() {
            let _ = self.errors.insert("name", "Name is required");
        }
        if self.user.email.is_empty() {
            let _ = self.errors.insert("email", "Email is required");
        } else if !self.user.email.contains('@') {
            let _ = self.errors.insert("email", "Email must contain @");
        }
        self.errors.is_empty()
    }

    fn error_slot(&self, field: &str) -> Slot {
        match self.errors.get(field) {
            Some(message) => format!("<span class=\"error\">{message}</span>").into(),
            None => Slot::Text(String::new()),
        }
    }

    fn render_body(&self) -> RenderedNode {
        if self.submitted {
            return RenderedNode::text(
                "<p>Form submitted successfully!</p><button phx-click=\"reset\">Reset</button>",
            );
        }
        node(
            &[
                "<form phx-change=\"validate\" phx-submit=\"save\">\
                 <div><label>Name:</label><input type=\"text\" name=\"name\" value=\"",
                "\"/>",
                "</div><div><label>Email:</label><input type=\"email\" name=\"email\" value=\"",
                "\"/>",
                "</div><button type=\"submit\">Save</button>\
                 <button type=\"button\" phx-click=\"reset\">Reset</button></form>",
            ],
            vec![
                escape(&self.user.name).into(),
                self.error_slot("name"),
                escape(&self.user.email).into(),
                self.error_slot("email"),
            ],
        )
    }
}

#[async_trait]
impl LiveView for Form {
    async fn mount(&mut self, _params: &Params, _ctx: &ViewContext) -> Result<(), ViewError> {
        *self = Self::default();
        Ok(())
    }

    async fn handle_event(
        &mut self,
        event: &str,
        value: &Value,
        _ctx: &ViewContext,
    ) -> Result<(), ViewError> {
        match event {
            "validate" => {
                let _ = self.validate(value);
            }
            "save" => self.submitted = self.validate(value),
            "reset" => *self = Self::default(),
            other => return Err(ViewError::new(format!("unknown event {other}"))),
        }
        Ok(())
    }

    fn render(&self) -> Renderable {
        node(
            &["<div><h1>User Form</h1>", "</div>"],
            vec![Slot::Node(self.render_body())],
        )
        .into()
    }
}
