//! Requests the catalog answers, independent of how they arrive (HTTP or
//! the command line).

use crate::error::Error;

pub trait Request {
    type Resp;
}

/// Read-only requests, answered from one consistent view of the store.
pub trait Queryable<Req>
where
    Req: Request,
{
    fn query(&self, req: Req) -> Result<Req::Resp, Error>;
}

/// Requests that write to the store.
pub trait Commandable<Req>
where
    Req: Request,
{
    fn execute(&self, req: Req) -> Result<Req::Resp, Error>;
}
