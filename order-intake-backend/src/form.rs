//! The order submission form
//!

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::Multipart;
use tracing::{debug, error};
use validator::{Validate, ValidationErrors};

use crate::order::WebError;

pub const EMAIL_FIELD: &str = "email";
pub const ATTACHMENTS_FIELD: &str = "attachments";
pub const EMAIL_MAX_LENGTH: u64 = 254;

const REQUIRED_MESSAGE: &str = "This field is required.";

/// Field name to the messages shown next to it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Default, Clone, Validate)]
pub struct OrderForm {
    #[validate(
        length(
            max = 254,
            message = "Ensure this value has at most 254 characters."
        ),
        email(message = "Enter a valid email address.")
    )]
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Everything a POST to the form carried.
#[derive(Debug, Default)]
pub struct OrderSubmission {
    pub form: OrderForm,
    pub files: Vec<UploadedFile>,
}

impl OrderForm {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.trim().to_string(),
        }
    }

    /// Checks the submitted values, returning per-field messages on failure.
    pub fn clean(&self) -> Result<(), FieldErrors> {
        if self.email.is_empty() {
            let mut errors = FieldErrors::new();
            errors.insert(EMAIL_FIELD.to_string(), vec![REQUIRED_MESSAGE.to_string()]);
            return Err(errors);
        }
        self.validate().map_err(field_errors)
    }

    /// The whole form page, with any errors from a failed submission.
    pub fn render(&self, errors: &FieldErrors) -> String {
        let mut body = String::from(
            "<html><body>\n<form action=\"/order\" method=\"post\" enctype=\"multipart/form-data\">\n",
        );

        if let Some(messages) = errors.get(EMAIL_FIELD) {
            body.push_str(&error_list(messages));
        }
        body.push_str(&format!(
            "<p><label for=\"id_{EMAIL_FIELD}\">Email:</label> <input type=\"email\" name=\"{EMAIL_FIELD}\" value=\"{}\" maxlength=\"{EMAIL_MAX_LENGTH}\" required id=\"id_{EMAIL_FIELD}\"></p>\n",
            escape_html(&self.email),
        ));

        if let Some(messages) = errors.get(ATTACHMENTS_FIELD) {
            body.push_str(&error_list(messages));
        }
        body.push_str(&format!(
            "<p><label for=\"id_{ATTACHMENTS_FIELD}\">Attachments:</label> <input type=\"file\" name=\"{ATTACHMENTS_FIELD}\" multiple id=\"id_{ATTACHMENTS_FIELD}\"></p>\n",
        ));

        body.push_str("<input type=\"submit\" value=\"Submit\">\n</form>\n</body></html>");
        body
    }
}

fn field_errors(errors: ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|err| match &err.message {
                    Some(message) => message.to_string(),
                    None => err.code.to_string(),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

fn error_list(messages: &[String]) -> String {
    let items: String = messages
        .iter()
        .map(|m| format!("<li>{}</li>", escape_html(m)))
        .collect();
    format!("<ul class=\"errorlist\">{items}</ul>\n")
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Pulls the email and every uploaded file out of a multipart body.
///
/// Parts without a filename that aren't the email are ignored, as are file
/// inputs the browser sent empty.
pub async fn read_submission(mut multipart: Multipart) -> Result<OrderSubmission, WebError> {
    let mut submission = OrderSubmission::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Failed to read multipart field: {:?}", e);
        WebError::new(e.status(), format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("").to_string();
        let filename = field.file_name().map(|s| s.to_string());

        match (field_name.as_str(), filename) {
            (_, Some(filename)) if !filename.is_empty() => {
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(|e| {
                    error!("Failed to read file data: {:?}", e);
                    WebError::new(e.status(), format!("Failed to read file data: {}", e))
                })?;
                debug!(
                    "Read {} bytes for {:?} ({:?}) from field {}",
                    data.len(),
                    filename,
                    content_type,
                    field_name
                );
                submission.files.push(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            (_, Some(_)) => {
                debug!("Skipping empty file input {}", field_name);
            }
            (EMAIL_FIELD, None) => {
                let value = field.text().await.map_err(|e| {
                    WebError::new(
                        e.status(),
                        format!("Failed to read field {}: {}", EMAIL_FIELD, e),
                    )
                })?;
                submission.form = OrderForm::new(&value);
            }
            _ => {
                debug!("Ignoring unknown multipart field: {}", field_name);
            }
        }
    }

    Ok(submission)
}
