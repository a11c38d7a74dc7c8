//! REST Protocol
//!
//! Routes and header names of the plain HTTP front end.
//!
//! - `POST /{key}`: request body is the message body; request headers whose names
//!   start with [`STORED_HEADER_PREFIX`] become the message headers. Responds with
//!   the pre-push depth in the [`HEADER_ID`] header and as the body.
//! - `GET /{key}`: responds with the top message body, its headers re-emitted and
//!   the current depth in [`HEADER_COUNT`].
//! - `DELETE /{key}`: as `GET`, but the message is removed.

/// Route serving all three methods.
pub const ENDPOINT_SECTION: &str = "/:key";

/// Response header carrying the pre-push depth.
pub const HEADER_ID: &str = "id";
/// Response header carrying the depth after a read.
pub const HEADER_COUNT: &str = "count";
/// Request headers with this (lowercase) prefix are stored with the message.
pub const STORED_HEADER_PREFIX: &str = "s-";

/// Body of the 404 for an unknown key.
pub const BODY_NOT_FOUND: &str = "Section not found";
/// Body of the 404 for an empty stack.
pub const BODY_EMPTY: &str = "Section is empty";

/// Response headers a stored header may not replace: framing, connection
/// management and the headers this API sets itself.
pub const RESERVED_HEADERS: &[&str] = &[
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "proxy-connection",
    "upgrade",
    "te",
    "trailer",
    HEADER_ID,
    HEADER_COUNT,
];
