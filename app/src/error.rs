use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use err_derive::Error;
use log::*;
use serde::Serialize;

use crate::catalog::Catalogued;

#[derive(Debug, Error)]
pub enum Error {
    #[error(display = "{}", _0)]
    NotFound(NotFound),
    #[error(display = "{}", _0)]
    BadRequest(String),
    #[error(display = "{}", _0)]
    Unhandled(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFound {
    #[error(display = "No {} found containing '{}'", collection, query)]
    Containing {
        collection: &'static str,
        query: String,
    },
    #[error(display = "{} '{}' not found", title, query)]
    Named { title: &'static str, query: String },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl NotFound {
    pub fn containing<D: Catalogued>(query: &str) -> Self {
        NotFound::Containing {
            collection: D::COLLECTION,
            query: query.to_string(),
        }
    }

    pub fn named<D: Catalogued>(query: &str) -> Self {
        NotFound::Named {
            title: D::TITLE,
            query: query.to_string(),
        }
    }
}

impl From<NotFound> for Error {
    fn from(err: NotFound) -> Self {
        Error::NotFound(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Unhandled(err)
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Unhandled(anyhow::Error::new(err).context("acquire store connection"))
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = match self {
            Error::NotFound(nf) => {
                debug!("Not found: {}", nf);
                nf.to_string()
            }
            Error::BadRequest(msg) => {
                debug!("Bad request: {}", msg);
                msg.clone()
            }
            Error::Unhandled(err) => {
                error!("Unhandled error: {:?}", err);
                "Internal Server Error".to_string()
            }
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { detail })
    }
}
