//! API 层：错误响应与请求/响应类型。

pub(crate) mod error;
pub(crate) mod types;
