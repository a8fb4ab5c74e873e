//! Domain error returned to RPC callers.
//!
//! An [`Error`] carries a stable documentation code (`ECMN-14-0`), the
//! protocol [`Code`] and a message rendered in the caller's locale. Code and
//! status never change after construction; every message or payload change
//! produces a new value, so the constants below are safe to share.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};

use crate::i18n::{catalog, Translator};
use crate::rpc::status::{Code, Status};

/// Boxed error returned by handlers.
pub type HandlerError = crate::lifecycle::service::BoxError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Error {
    code: &'static str,
    status: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip)]
    data: Option<Value>,
}

/// 400
pub const ERR_BAD_REQUEST: Error = Error::new("ECMN-03-0", Code::InvalidArgument);
/// 401
pub const ERR_UNAUTHORIZED: Error = Error::new("ECMN-16-0", Code::Unauthenticated);
/// 403
pub const ERR_FORBIDDEN: Error = Error::new("ECMN-07-0", Code::PermissionDenied);
/// 404
pub const ERR_NOT_FOUND: Error = Error::new("ECMN-05-0", Code::NotFound);
/// 409
pub const ERR_CONFLICT: Error = Error::new("ECMN-06-0", Code::AlreadyExists);
/// 500
pub const ERR_INTERNAL: Error = Error::new("ECMN-02-0", Code::Internal);
/// 503
pub const ERR_SERVICE_UNAVAILABLE: Error = Error::new("ECMN-14-0", Code::Unavailable);
pub const ERR_RESOURCE_IN_USE: Error = Error::new("ECMN-09-0", Code::FailedPrecondition);

impl Error {
    pub const fn new(code: &'static str, status: Code) -> Self {
        Self {
            code,
            status,
            message: None,
            data: None,
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn status(&self) -> Code {
        self.status
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Rendered message. Never-rendered errors use the built-in English pack.
    pub fn message(&self) -> Cow<'_, str> {
        match &self.message {
            Some(message) => Cow::Borrowed(message),
            None => {
                let builtin = catalog::builtin();
                let text = builtin.translate(self.code, builtin.default_locale(), self.data.as_ref());
                Cow::Owned(format!("{}: {}", self.code, text))
            }
        }
    }

    /// Copy with a new payload. The message is cleared until the next `exec`.
    pub fn with_data(&self, data: Value) -> Self {
        Self {
            code: self.code,
            status: self.status,
            message: None,
            data: Some(data),
        }
    }

    /// Shorthand for a payload with a single `info` field.
    pub fn with_info(&self, info: impl Into<String>) -> Self {
        self.with_data(json!({ "info": info.into() }))
    }

    /// Copy rendered in `locale`. `data` replaces the payload when given.
    pub fn exec(&self, locale: &str, data: Option<Value>, translator: &dyn Translator) -> Self {
        let data = data.or_else(|| self.data.clone());
        let text = translator.translate(self.code, locale, data.as_ref());
        Self {
            code: self.code,
            status: self.status,
            message: Some(format!("{}: {}", self.code, text)),
            data,
        }
    }

    /// Prototype for a protocol code.
    pub fn from_status_code(code: Code) -> Self {
        match code {
            Code::Unknown | Code::DataLoss => ERR_INTERNAL,
            Code::InvalidArgument | Code::OutOfRange => ERR_BAD_REQUEST,
            Code::FailedPrecondition => ERR_RESOURCE_IN_USE,
            Code::NotFound => ERR_NOT_FOUND,
            Code::PermissionDenied => ERR_FORBIDDEN,
            Code::Unauthenticated => ERR_UNAUTHORIZED,
            Code::AlreadyExists | Code::Aborted => ERR_CONFLICT,
            Code::Unavailable => ERR_SERVICE_UNAVAILABLE,
            _ => ERR_INTERNAL,
        }
    }

    /// Turn any handler error into a domain error.
    ///
    /// Domain errors pass through, bare [`Status`] errors go through the
    /// code table and keep their status, anything else is Internal.
    pub fn convert(err: HandlerError) -> Self {
        let err = match err.downcast::<Error>() {
            Ok(e) => return *e,
            Err(err) => err,
        };
        match err.downcast::<Status>() {
            Ok(status) => {
                // An error carrying Ok would reach the client as a success.
                let code = match status.code {
                    Code::Ok => Code::Internal,
                    code => code,
                };
                let proto = Self::from_status_code(code);
                Self {
                    code: proto.code,
                    status: code,
                    message: None,
                    data: Some(json!({ "info": status.message })),
                }
            }
            Err(other) => ERR_INTERNAL.with_info(other.to_string()),
        }
    }

    /// JSON body sent on the wire.
    pub fn to_body(&self) -> Value {
        json!({
            "code": self.code,
            "status": u8::from(self.status),
            "message": self.message(),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Error {}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::convert(Box::new(status))
    }
}
