use http::HeaderMap;

/// Header carrying the requester identity set by the fronting proxy
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Access to the identity of the caller behind an inbound request.
pub trait RequestContext: Send + Sync {
    /// Forwarded requester identity, if the request carried one.
    fn forwarded_identity(&self) -> Option<String>;
}

impl RequestContext for HeaderMap {
    fn forwarded_identity(&self) -> Option<String> {
        let values: Vec<&str> = self
            .get_all(FORWARDED_FOR_HEADER)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}

/// Fixed identity, for internal callers and tests
#[derive(Debug, Clone, Default)]
pub struct StaticRequestContext(pub Option<String>);

impl StaticRequestContext {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(Some(identity.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl RequestContext for StaticRequestContext {
    fn forwarded_identity(&self) -> Option<String> {
        self.0.clone()
    }
}
