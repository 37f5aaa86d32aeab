#![allow(missing_docs)]

pub(crate) mod fixture;
pub(crate) mod http;

pub(crate) use fixture::Fixture;
pub(crate) use http::{assert_content_type, assert_status, get_header, parse_json_body};
