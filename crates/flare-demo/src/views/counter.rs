//! Counter with increment, decrement and set.

use async_trait::async_trait;
use flare_live::{LiveView, Params, ViewContext, ViewError};
use flare_render::Renderable;
use serde_json::Value;

/// Topic the counter is joined on.
pub const TOPIC: &str = "counter";

/// A single integer, changed by client events.
#[derive(Debug, Default)]
pub struct Counter {
    count: i64,
}

/// Accepts a JSON integer or a decimal string, as sent by form inputs.
fn parse_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl LiveView for Counter {
    async fn mount(&mut self, params: &Params, _ctx: &ViewContext) -> Result<(), ViewError> {
        self.count = match params.get("start") {
            Some(start) => parse_count(start)
                .ok_or_else(|| ViewError::new("start must be an integer"))?,
            None => 0,
        };
        Ok(())
    }

    async fn handle_event(
        &mut self,
        event: &str,
        value: &Value,
        _ctx: &ViewContext,
    ) -> Result<(), ViewError> {
        match event {
            "inc" => self.count = self.count.saturating_add(1),
            "dec" => self.count = self.count.saturating_sub(1),
            "set" => {
                self.count = value
                    .get("value")
                    .and_then(parse_count)
                    .ok_or_else(|| ViewError::new("value must be an integer"))?;
            }
            other => return Err(ViewError::new(format!("unknown event {other}"))),
        }
        Ok(())
    }

    fn render(&self) -> Renderable {
        format!(
            "<div><h1>Count: <!--$0-->{}<!--/$0--></h1>\
             <button phx-click=\"dec\">-</button>\
             <button phx-click=\"inc\">+</button>\
             <form phx-submit=\"set\"><input type=\"number\" name=\"value\"/>\
             <button type=\"submit\">Set</button></form></div>",
            self.count
        )
        .into()
    }
}
