use axum::extract::Multipart;
use server_api::{BlobFile, BlobMessage, BlobTokenOperation};
use shared::error::ApiError;

/// Fields of a blob upload form. Everything but `file` is optional here;
/// controllers enforce what each operation requires.
#[derive(Debug, Default)]
pub(crate) struct BlobForm {
    pub(crate) file: Option<BlobFile>,
    pub(crate) tag: Option<String>,
    pub(crate) topic: Option<String>,
    pub(crate) pool: Option<String>,
    pub(crate) amount: Option<String>,
    pub(crate) token_index: Option<String>,
    pub(crate) to: Option<String>,
    pub(crate) recipients: Vec<String>,
}

pub(crate) async fn read_blob_form(mut multipart: Multipart) -> Result<BlobForm, ApiError> {
    let mut form = BlobForm::default();
    while let Some(field) = multipart.next_field().await.map_err(invalid_body)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| "blob".to_string());
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(invalid_body)?;
            form.file = Some(BlobFile {
                filename,
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field.text().await.map_err(invalid_body)?;
        match name.as_str() {
            "tag" => form.tag = Some(value),
            "topic" => form.topic = Some(value),
            "pool" => form.pool = Some(value),
            "amount" => form.amount = Some(value),
            "tokenIndex" => form.token_index = Some(value),
            "to" => form.to = Some(value),
            "recipients" | "recipients[]" => form.recipients.push(value),
            _ => {}
        }
    }
    Ok(form)
}

impl BlobForm {
    pub(crate) fn into_message(self) -> Result<BlobMessage, ApiError> {
        Ok(BlobMessage {
            file: self.file.ok_or_else(missing_file)?,
            tag: self.tag,
            topic: self.topic,
            recipients: self.recipients,
        })
    }

    pub(crate) fn into_token_operation(self) -> Result<BlobTokenOperation, ApiError> {
        Ok(BlobTokenOperation {
            file: self.file.ok_or_else(missing_file)?,
            tag: self.tag,
            topic: self.topic,
            pool: self.pool.unwrap_or_default(),
            amount: self.amount.unwrap_or_default(),
            token_index: self.token_index,
            to: self.to,
        })
    }
}

fn missing_file() -> ApiError {
    ApiError::validation("file is required")
}

fn invalid_body(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::validation(format!("invalid multipart body: {err}"))
}
