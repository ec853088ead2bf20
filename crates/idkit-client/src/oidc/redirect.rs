//! Redirect targets read from `Location` headers.

use reqwest::Url;

use crate::error::ClientError;

/// Absolute URL a response redirected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    url: Url,
}

impl RedirectTarget {
    /// Resolve a `Location` value (absolute or relative) against the
    /// URL of the request that produced it.
    pub fn resolve(request_url: &Url, location: &str) -> Result<Self, ClientError> {
        let url = request_url
            .join(location)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", location, e)))?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Query parameter value.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Fragment parameter value (implicit flow responses).
    pub fn fragment_param(&self, name: &str) -> Option<String> {
        let fragment = self.url.fragment()?;
        url_pairs(fragment).find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Query parameter, falling back to the fragment.
    pub fn param(&self, name: &str) -> Option<String> {
        self.query_param(name).or_else(|| self.fragment_param(name))
    }

    /// `code` parameter of an authorization response.
    pub fn authorization_code(&self) -> Option<String> {
        self.query_param("code")
    }
}

fn url_pairs(encoded: &str) -> impl Iterator<Item = (String, String)> {
    reqwest::Url::parse(&format!("http://fragment.invalid/?{}", encoded))
        .map(|u| {
            u.query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://localhost:9853/oauth2/authorize?response_type=code").expect("valid")
    }

    #[test]
    fn test_resolve_absolute() {
        let target = RedirectTarget::resolve(
            &base(),
            "http://localhost:8490/playground2/oauth2client?code=c0de&session_state=s",
        )
        .expect("resolves");
        assert_eq!(target.url().host_str(), Some("localhost"));
        assert_eq!(target.authorization_code().as_deref(), Some("c0de"));
        assert_eq!(target.query_param("session_state").as_deref(), Some("s"));
    }

    #[test]
    fn test_resolve_relative() {
        let target = RedirectTarget::resolve(
            &base(),
            "/authenticationendpoint/login.do?sessionDataKey=k1",
        )
        .expect("resolves");
        assert_eq!(
            target.as_str(),
            "https://localhost:9853/authenticationendpoint/login.do?sessionDataKey=k1"
        );
    }

    #[test]
    fn test_fragment_params() {
        let target = RedirectTarget::resolve(
            &base(),
            "http://localhost:8490/cb#access_token=tok%20en&token_type=Bearer",
        )
        .expect("resolves");
        assert_eq!(target.fragment_param("access_token").as_deref(), Some("tok en"));
        assert_eq!(target.param("token_type").as_deref(), Some("Bearer"));
        assert!(target.authorization_code().is_none());
    }

    #[test]
    fn test_resolve_invalid() {
        let err = RedirectTarget::resolve(&base(), "http://[::1").unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }
}
