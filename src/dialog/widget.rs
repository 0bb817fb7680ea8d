//! Dialog box descriptions and typed decoding of operator replies.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::errors::DialogError;

/// Image shown next to a dialog or operator message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageComponent {
    /// Path or URL the panel loads the image from
    pub address: String,
    /// Display width in percent
    #[serde(default = "default_image_width")]
    pub width: i32,
    /// Border thickness in pixels
    #[serde(default)]
    pub border: i32,
}

fn default_image_width() -> i32 {
    100
}

impl ImageComponent {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            width: default_image_width(),
            border: 0,
        }
    }

    pub fn with_width(mut self, width: i32) -> Self {
        self.width = width;
        self
    }

    pub fn with_border(mut self, border: i32) -> Self {
        self.border = border;
        self
    }

    pub fn validate(&self) -> Result<(), DialogError> {
        if self.width <= 0 {
            return Err(DialogError::WidgetConfig(format!(
                "image width must be positive, got {}",
                self.width
            )));
        }
        if self.border < 0 {
            return Err(DialogError::WidgetConfig(format!(
                "image border must not be negative, got {}",
                self.border
            )));
        }
        Ok(())
    }
}

/// One step of a multistep instruction widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub title: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<ImageComponent>,
}

/// Input widget requested from the operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "info", rename_all = "snake_case")]
pub enum Widget {
    /// Plain confirmation button
    #[default]
    Base,
    TextInput,
    NumericInput,
    RadioButton { fields: Vec<String> },
    Checkbox { fields: Vec<String> },
    Multistep { steps: Vec<Step> },
}

impl Widget {
    pub fn validate(&self) -> Result<(), DialogError> {
        match self {
            Widget::RadioButton { fields } | Widget::Checkbox { fields } => {
                if fields.is_empty() {
                    return Err(DialogError::WidgetConfig(
                        "choice widget needs at least one field".to_string(),
                    ));
                }
                let unique: BTreeSet<&String> = fields.iter().collect();
                if unique.len() != fields.len() {
                    return Err(DialogError::WidgetConfig(
                        "choice widget fields must be unique".to_string(),
                    ));
                }
            }
            Widget::Multistep { steps } => {
                if steps.is_empty() {
                    return Err(DialogError::WidgetConfig(
                        "multistep widget needs at least one step".to_string(),
                    ));
                }
                for step in steps {
                    if let Some(image) = &step.image {
                        image.validate()?;
                    }
                }
            }
            Widget::Base | Widget::TextInput | Widget::NumericInput => {}
        }
        Ok(())
    }

    /// Convert a decoded reply into a typed value.
    pub fn decode(&self, raw: &str) -> Result<DialogValue, DialogError> {
        match self {
            Widget::Base | Widget::Multistep { .. } => Ok(DialogValue::Confirmed(parse_flag(raw))),
            Widget::TextInput => Ok(DialogValue::Text(raw.to_string())),
            Widget::NumericInput => raw.trim().parse::<f64>().map(DialogValue::Number).map_err(|_| {
                DialogError::WidgetConfig(format!("cannot parse '{}' as a number", raw))
            }),
            Widget::RadioButton { fields } => {
                let choice = strip_quotes(raw.trim());
                if !fields.iter().any(|f| f == choice) {
                    return Err(DialogError::WidgetConfig(format!(
                        "'{}' is not one of the offered choices",
                        choice
                    )));
                }
                Ok(DialogValue::Choice(choice.to_string()))
            }
            Widget::Checkbox { fields } => {
                let choices = parse_choices(raw);
                if let Some(unknown) = choices.iter().find(|c| !fields.contains(c)) {
                    return Err(DialogError::WidgetConfig(format!(
                        "'{}' is not one of the offered choices",
                        unknown
                    )));
                }
                Ok(DialogValue::Choices(choices))
            }
        }
    }
}

/// Typed operator answer.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogValue {
    Confirmed(bool),
    Text(String),
    Number(f64),
    Choice(String),
    Choices(BTreeSet<String>),
    PassFail {
        passed: bool,
        value: Box<DialogValue>,
    },
}

/// A blocking request for operator input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogBox {
    pub dialog_text: String,
    #[serde(default)]
    pub title_bar: Option<String>,
    #[serde(default)]
    pub widget: Widget,
    #[serde(default)]
    pub image: Option<ImageComponent>,
    /// Ask for a pass/fail verdict in addition to the widget value
    #[serde(default)]
    pub pass_fail: bool,
    #[serde(default)]
    pub font_size: Option<u32>,
}

impl DialogBox {
    pub fn new(dialog_text: impl Into<String>) -> Self {
        Self {
            dialog_text: dialog_text.into(),
            title_bar: None,
            widget: Widget::Base,
            image: None,
            pass_fail: false,
            font_size: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title_bar = Some(title.into());
        self
    }

    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.widget = widget;
        self
    }

    pub fn with_image(mut self, image: ImageComponent) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_pass_fail(mut self) -> Self {
        self.pass_fail = true;
        self
    }

    pub fn validate(&self) -> Result<(), DialogError> {
        self.widget.validate()?;
        if let Some(image) = &self.image {
            image.validate()?;
        }
        if self.font_size == Some(0) {
            return Err(DialogError::WidgetConfig("font size must be positive".to_string()));
        }
        Ok(())
    }

    /// Content published to the state view.
    pub fn to_published(&self, id: Uuid) -> Value {
        json!({
            "id": id.to_string(),
            "visible": true,
            "title_bar": self.title_bar,
            "dialog_text": self.dialog_text,
            "widget": self.widget,
            "image": self.image,
            "pass_fail": self.pass_fail,
            "font_size": self.font_size,
        })
    }

    /// Decode the operator reply for this dialog.
    ///
    /// Pass/fail dialogs expect `{"pass_fail": <bool>, "data": "<widget reply>"}`.
    pub fn decode(&self, raw: &str) -> Result<DialogValue, DialogError> {
        if !self.pass_fail {
            return self.widget.decode(raw);
        }
        #[derive(Deserialize)]
        struct PassFailReply {
            pass_fail: bool,
            #[serde(default)]
            data: String,
        }
        let reply: PassFailReply = serde_json::from_str(raw).map_err(|e| {
            DialogError::WidgetConfig(format!("invalid pass/fail reply: {}", e))
        })?;
        Ok(DialogValue::PassFail {
            passed: reply.pass_fail,
            value: Box::new(self.widget.decode(&reply.data)?),
        })
    }
}

/// Interpret a confirmation reply; anything but an explicit negative confirms.
pub(crate) fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no"
    )
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

/// Parse a multiple-choice reply: a JSON array or a brace/bracket delimited,
/// comma separated list of optionally quoted items.
fn parse_choices(raw: &str) -> BTreeSet<String> {
    let trimmed = raw.trim();
    if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
        return items.into_iter().collect();
    }
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .or_else(|| trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(|item| strip_quotes(item.trim()).to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_checkbox_python_set_reply() {
        let widget = Widget::Checkbox {
            fields: vec!["one".into(), "two".into(), "three".into()],
        };
        assert_eq!(
            widget.decode(r#"{"one","two"}"#).unwrap(),
            DialogValue::Choices(set(&["one", "two"]))
        );
    }

    #[test]
    fn test_checkbox_json_array_and_empty() {
        let widget = Widget::Checkbox {
            fields: vec!["one".into(), "two".into()],
        };
        assert_eq!(
            widget.decode(r#"["two"]"#).unwrap(),
            DialogValue::Choices(set(&["two"]))
        );
        assert_eq!(widget.decode("{}").unwrap(), DialogValue::Choices(set(&[])));
    }

    #[test]
    fn test_checkbox_unknown_choice() {
        let widget = Widget::Checkbox {
            fields: vec!["one".into()],
        };
        assert!(matches!(
            widget.decode(r#"{"one","nine"}"#),
            Err(DialogError::WidgetConfig(_))
        ));
    }

    #[test]
    fn test_radio_button() {
        let widget = Widget::RadioButton {
            fields: vec!["red".into(), "green".into()],
        };
        assert_eq!(
            widget.decode("green").unwrap(),
            DialogValue::Choice("green".into())
        );
        assert!(widget.decode("blue").is_err());
    }

    #[test]
    fn test_numeric_input() {
        assert_eq!(
            Widget::NumericInput.decode(" 3.25 ").unwrap(),
            DialogValue::Number(3.25)
        );
        let err = Widget::NumericInput.decode("twelve").unwrap_err();
        assert!(matches!(err, DialogError::WidgetConfig(msg) if msg.contains("twelve")));
    }

    #[test]
    fn test_text_and_confirm() {
        assert_eq!(
            Widget::TextInput.decode("hello world").unwrap(),
            DialogValue::Text("hello world".into())
        );
        assert_eq!(Widget::Base.decode("").unwrap(), DialogValue::Confirmed(true));
        assert_eq!(
            Widget::Base.decode("false").unwrap(),
            DialogValue::Confirmed(false)
        );
    }

    #[test]
    fn test_pass_fail_reply() {
        let dialog = DialogBox::new("Is the LED green?")
            .with_widget(Widget::TextInput)
            .with_pass_fail();
        assert_eq!(
            dialog
                .decode(r#"{"pass_fail": false, "data": "it is red"}"#)
                .unwrap(),
            DialogValue::PassFail {
                passed: false,
                value: Box::new(DialogValue::Text("it is red".into())),
            }
        );
        assert!(matches!(
            dialog.decode("yes"),
            Err(DialogError::WidgetConfig(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        let negative = DialogBox::new("x").with_image(ImageComponent::new("a.png").with_width(-10));
        assert!(matches!(negative.validate(), Err(DialogError::WidgetConfig(_))));

        let border = DialogBox::new("x").with_image(ImageComponent::new("a.png").with_border(-1));
        assert!(border.validate().is_err());

        let empty = DialogBox::new("x").with_widget(Widget::RadioButton { fields: vec![] });
        assert!(empty.validate().is_err());

        let dup = DialogBox::new("x").with_widget(Widget::Checkbox {
            fields: vec!["a".into(), "a".into()],
        });
        assert!(dup.validate().is_err());

        let steps = DialogBox::new("x").with_widget(Widget::Multistep { steps: vec![] });
        assert!(steps.validate().is_err());

        assert!(DialogBox::new("ok").validate().is_ok());
    }

    #[test]
    fn test_published_shape() {
        let dialog = DialogBox::new("Pick")
            .with_title("Stand")
            .with_widget(Widget::RadioButton {
                fields: vec!["a".into()],
            });
        let id = Uuid::new_v4();
        let published = dialog.to_published(id);
        assert_eq!(published["visible"], true);
        assert_eq!(published["id"], id.to_string());
        assert_eq!(published["widget"]["type"], "radio_button");
        assert_eq!(published["widget"]["info"]["fields"][0], "a");
        assert_eq!(published["title_bar"], "Stand");
    }
}
