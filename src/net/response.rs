//! Decoding of server response payloads.
//!
//! A response payload is a JSON object `{t, r, e?, b?, p?}`: the numeric
//! response kind, the result array, and optionally an error kind, a
//! backtrace and a profile. Only well-known codes are accepted.

use crate::error::{Error, Result, ServerErrorKind};
use crate::reql::datum::Datum;
use crate::reql::json;
use crate::reql::terms::{ErrorType, ResponseType};

/// One decoded server response for a token.
#[derive(Debug)]
pub struct Response {
    pub kind: ResponseType,
    /// Set only on RUNTIME_ERROR responses.
    pub error_kind: Option<ErrorType>,
    pub result: Vec<Datum>,
    pub backtrace: Option<Datum>,
    pub profile: Option<Datum>,
}

impl Response {
    /// Decode a parsed payload datum.
    pub(crate) fn decode(payload: Datum) -> Result<Response> {
        let mut object = match payload {
            Datum::Object(object) => object,
            other => {
                return Err(Error::Protocol(format!(
                    "response is not an object: {}",
                    json::write(&other)
                )))
            }
        };
        let kind = match object.remove("t") {
            Some(Datum::Number(code)) => ResponseType::from_code(code)?,
            _ => return Err(Error::Protocol("response has no numeric `t` field".into())),
        };
        let error_kind = match object.remove("e") {
            Some(Datum::Number(code)) => Some(ErrorType::from_code(code)?),
            Some(_) => return Err(Error::Protocol("response `e` field is not a number".into())),
            None => None,
        };
        let result = match object.remove("r") {
            Some(Datum::Array(items)) => items,
            _ => return Err(Error::Protocol("response has no array `r` field".into())),
        };
        Ok(Response {
            kind,
            error_kind,
            result,
            backtrace: object.remove("b"),
            profile: object.remove("p"),
        })
    }

    /// Turn an error (or unexpected) response into the error it describes.
    pub(crate) fn into_error(self) -> Error {
        let Response {
            kind,
            error_kind,
            result,
            backtrace,
            ..
        } = self;
        let message = if result.len() == 1 {
            match &result[0] {
                Datum::String(s) => s.clone(),
                other => json::write(other),
            }
        } else {
            json::write(&Datum::Array(result))
        };
        let kind = match kind {
            ResponseType::ClientError => ServerErrorKind::Client,
            ResponseType::CompileError => ServerErrorKind::Compile,
            ResponseType::RuntimeError => error_kind
                .map(ErrorType::kind)
                .unwrap_or(ServerErrorKind::Runtime),
            other => {
                return Error::Protocol(format!("unexpected response: {}", other.name()));
            }
        };
        Error::Server {
            kind,
            message,
            backtrace,
        }
    }
}
