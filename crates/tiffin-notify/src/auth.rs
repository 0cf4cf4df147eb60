//! Bearer-token access for the broker handshake. The session store owns the
//! credential; this seam keeps it an external collaborator.

/// Source of the bearer token attached to the connection handshake. Queried
/// on every dial so a refreshed token is picked up by the next attempt.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn bearer_token(&self) -> Option<String> {
        self()
    }
}

/// Fixed token, for embedding contexts that swap providers on refresh.
#[derive(Debug, Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Anonymous sessions still get a handshake, just without a credential.
    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_yields_its_value() {
        assert_eq!(StaticToken::new("abc").bearer_token().as_deref(), Some("abc"));
        assert_eq!(StaticToken::none().bearer_token(), None);
    }

    #[test]
    fn closures_are_providers() {
        let provider = || Some("fresh".to_string());
        assert_eq!(provider.bearer_token().as_deref(), Some("fresh"));
    }
}
