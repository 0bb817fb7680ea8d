//! Operator interaction: blocking dialog boxes and operator messages.
//!
//! A request is published into the state view, persisted so the panel sees
//! it, answered through a [`ResponseChannel`], and then cleared again.

mod channel;
mod widget;

pub use channel::{
    ChannelFactory, MAX_REPLY_BYTES, MemoryChannel, MemoryChannelFactory, MemoryReplier,
    ResponseChannel, TcpChannelFactory, TcpResponseChannel, decode_reply, encode_reply, send_reply,
};
pub use widget::{DialogBox, DialogValue, ImageComponent, Step, Widget};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::DialogError;
use crate::model::fields;
use crate::reporter::{ReporterHandle, ViewMask, case_key};

/// Show a dialog box for a case and wait for the operator's answer.
///
/// Only one dialog box may be open in the whole run; a second request fails
/// with [`DialogError::DuplicateRequest`] and leaves the open one untouched.
/// The published request is cleared whether or not a reply arrives.
pub async fn run_dialog_box(
    reporter: &ReporterHandle,
    module_id: &str,
    case_id: &str,
    dialog: &DialogBox,
    channel: &mut dyn ResponseChannel,
    cancel: &CancellationToken,
) -> Result<DialogValue, DialogError> {
    dialog.validate()?;
    let key = case_key(module_id, case_id, fields::DIALOG_BOX);
    {
        let mut r = reporter.lock()?;
        if let Some((m, c)) = r.open_dialog_boxes().into_iter().next() {
            return Err(DialogError::DuplicateRequest(format!("{}::{}", m, c)));
        }
        r.set_doc_value(&key, dialog.to_published(Uuid::new_v4()), ViewMask::STATE_ONLY)?;
        r.update_db_by_doc()?;
    }
    debug!(module = module_id, case = case_id, "dialog box published");

    let reply = channel.receive(cancel).await;

    {
        let mut r = reporter.lock()?;
        r.set_doc_value(&key, Value::Null, ViewMask::STATE_ONLY)?;
        r.update_db_by_doc()?;
    }

    let raw = reply?;
    dialog.decode(&raw).inspect_err(|e| {
        warn!(module = module_id, case = case_id, error = %e, "operator reply rejected");
    })
}

/// Message shown to the operator outside of any case.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorMessage {
    pub msg: String,
    pub title: Option<String>,
    pub image: Option<ImageComponent>,
    pub font_size: Option<u32>,
    /// Wait until the operator dismisses the message
    pub block: bool,
}

impl OperatorMessage {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            title: None,
            image: None,
            font_size: None,
            block: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_image(mut self, image: ImageComponent) -> Self {
        self.image = Some(image);
        self
    }

    pub fn blocking(mut self) -> Self {
        self.block = true;
        self
    }

    fn to_published(&self, id: Uuid) -> Value {
        json!({
            "id": id.to_string(),
            "visible": true,
            "msg": self.msg,
            "title": self.title,
            "image": self.image,
            "font_size": self.font_size,
        })
    }
}

/// Publish an operator message, replacing any previous one.
///
/// Non-blocking messages return `true` immediately. Blocking messages wait
/// for a boolean "still visible" reply; a `false` reply removes the message.
pub async fn set_operator_message(
    reporter: &ReporterHandle,
    message: &OperatorMessage,
    channel: &mut dyn ResponseChannel,
    cancel: &CancellationToken,
) -> Result<bool, DialogError> {
    if let Some(image) = &message.image {
        image.validate()?;
    }
    publish_operator_message(reporter, message.to_published(Uuid::new_v4()))?;
    if !message.block {
        return Ok(true);
    }

    let visible = match channel.receive(cancel).await {
        Ok(raw) => widget::parse_flag(&raw),
        Err(e) => {
            publish_operator_message(reporter, Value::Null)?;
            return Err(e);
        }
    };
    if visible {
        reporter.with(|r| {
            r.set_doc_value(
                &format!("{}.visible", fields::OPERATOR_MSG),
                json!(true),
                ViewMask::STATE_ONLY,
            )?;
            r.update_db_by_doc()
        })?;
    } else {
        publish_operator_message(reporter, Value::Null)?;
    }
    Ok(visible)
}

/// Remove the operator message without waiting for anything.
pub fn clear_operator_message(reporter: &ReporterHandle) -> Result<(), DialogError> {
    publish_operator_message(reporter, Value::Null)
}

fn publish_operator_message(reporter: &ReporterHandle, value: Value) -> Result<(), DialogError> {
    reporter.with(|r| {
        r.set_doc_value(fields::OPERATOR_MSG, value, ViewMask::STATE_ONLY)?;
        r.update_db_by_doc()
    })?;
    Ok(())
}
