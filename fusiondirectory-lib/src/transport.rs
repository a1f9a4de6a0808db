/// This will use the real or the mock implementation, depending on whether we are compiling for tests or not.
#[mockall_double::double]
pub use client::HttpTransport;

use crate::error::{ErrorKind, ServiceError};

/// Header FusionDirectory expects the session token in.
pub const SESSION_TOKEN_HEADER: &str = "Session-Token";

/// A request against the FusionDirectory REST API, relative to the configured endpoint.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: reqwest::Method,
    /// Path segments, each one is percent-encoded on its own. This keeps DNs in one piece.
    pub path: Vec<String>,
    pub query: Vec<(String, String)>,
    pub session_token: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: reqwest::Method, path: &[&str]) -> Self {
        Self {
            method,
            path: path.iter().map(|segment| segment.to_string()).collect(),
            query: Vec::new(),
            session_token: None,
            body: None,
        }
    }

    pub fn get(path: &[&str]) -> Self {
        Self::new(reqwest::Method::GET, path)
    }

    pub fn post(path: &[&str]) -> Self {
        Self::new(reqwest::Method::POST, path)
    }

    pub fn put(path: &[&str]) -> Self {
        Self::new(reqwest::Method::PUT, path)
    }

    pub fn patch(path: &[&str]) -> Self {
        Self::new(reqwest::Method::PATCH, path)
    }

    pub fn delete(path: &[&str]) -> Self {
        Self::new(reqwest::Method::DELETE, path)
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_session_token(&self, token: &str) -> Self {
        Self {
            session_token: Some(token.to_string()),
            ..self.clone()
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path.join("/"))
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: reqwest::StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ServiceError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// The URL a request is sent to. Every path segment is percent-encoded on its own, so a DN stays one segment.
pub fn request_url(endpoint: &reqwest::Url, request: &ApiRequest) -> Result<reqwest::Url, ServiceError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| ServiceError(ErrorKind::Configuration, format!("FusionDirectory url '{endpoint}' cannot be used as a base")))?
        .pop_if_empty()
        .extend(request.path.iter());
    if !request.query.is_empty() {
        url.query_pairs_mut().extend_pairs(request.query.iter());
    }
    Ok(url)
}

/// The HTTP request for an [ApiRequest]: JSON in both directions, session token in its own header.
pub fn http_request(client: &reqwest::Client, endpoint: &reqwest::Url, request: &ApiRequest) -> Result<reqwest::Request, ServiceError> {
    let mut builder = client
        .request(request.method.clone(), request_url(endpoint, request)?)
        .header(reqwest::header::ACCEPT, "application/json");
    if let Some(token) = &request.session_token {
        builder = builder.header(SESSION_TOKEN_HEADER, token);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }
    builder
        .build()
        .map_err(|e| ServiceError(ErrorKind::InvalidPayload, format!("Could not build request {request}: {e}")))
}

#[cfg(not(test))]
mod client {
    use std::{fmt::Formatter, time};

    use super::*;

    /// Sends requests to one FusionDirectory REST endpoint. Knows nothing about sessions.
    pub struct HttpTransport {
        client: reqwest::Client,
        endpoint: reqwest::Url,
    }

    impl HttpTransport {
        pub fn new(endpoint: &str, insecure_disable_tls_verification: bool, timeout: time::Duration) -> Result<Self, ServiceError> {
            let endpoint = reqwest::Url::parse(endpoint).map_err(|e| {
                ServiceError(
                    ErrorKind::Configuration,
                    format!("Invalid FusionDirectory url '{endpoint}': {e}"),
                )
            })?;
            if endpoint.cannot_be_a_base() {
                return Err(ServiceError(
                    ErrorKind::Configuration,
                    format!("FusionDirectory url '{endpoint}' cannot be used as a base"),
                ));
            }

            let client = reqwest::Client::builder()
                .danger_accept_invalid_certs(insecure_disable_tls_verification)
                .timeout(timeout)
                .build()
                .map_err(|e| ServiceError(ErrorKind::Configuration, format!("Could not set up HTTP client: {e}")))?;

            Ok(Self { client, endpoint })
        }

        pub fn endpoint(&self) -> &str {
            self.endpoint.as_str()
        }

        pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ServiceError> {
            let http_request = http_request(&self.client, &self.endpoint, request)?;
            tracing::trace!(url = %http_request.url(), method = %request.method, "Sending request to FusionDirectory");

            let response = self.client.execute(http_request).await.map_err(|e| {
                tracing::error!(error = ?e, %request, "Could not send request to FusionDirectory");
                ServiceError(ErrorKind::Communication, format!("Could not connect to FusionDirectory: {e}"))
            })?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ServiceError(ErrorKind::Communication, format!("Could not read FusionDirectory answer: {e}")))?;
            tracing::trace!(%request, status = status.as_u16(), %body, "Received answer from FusionDirectory");

            Ok(ApiResponse { status, body })
        }
    }

    impl std::fmt::Debug for HttpTransport {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "FusionDirectory transport for '{}'", self.endpoint)
        }
    }
}


#[cfg(test)]
mod tests {
    use rstest::*;
    use serde_json::json;

    use super::*;

    const DN: &str = "cn=John Doe/Admin,ou=people,dc=example,dc=org";

    #[rstest]
    #[case::without_trailing_slash("http://fusiondirectory.test/rest.php/v1")]
    #[case::with_trailing_slash("http://fusiondirectory.test/rest.php/v1/")]
    fn when_building_url__then_keep_dn_in_one_segment(#[case] endpoint: &str) {
        // given
        let endpoint = reqwest::Url::parse(endpoint).unwrap();
        let request = ApiRequest::get(&["objects", "user", DN, "user"]);

        // when
        let url = request_url(&endpoint, &request).unwrap();

        // then
        assert_eq!(
            "http://fusiondirectory.test/rest.php/v1/objects/user/cn=John%20Doe%2FAdmin,ou=people,dc=example,dc=org/user",
            url.as_str()
        );
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(6, segments.len());
    }

    #[rstest]
    fn when_building_url_with_query__then_encode_pairs() {
        // given
        let endpoint = reqwest::Url::parse("http://fusiondirectory.test/rest.php/v1").unwrap();
        let request = ApiRequest::get(&["objects", "user"])
            .with_query("filter", "(uid=j*)")
            .with_query("attrs[uid]", "*");

        // when
        let url = request_url(&endpoint, &request).unwrap();

        // then
        assert_eq!(Some("filter=%28uid%3Dj*%29&attrs%5Buid%5D=*"), url.query());
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            vec![
                ("filter".to_string(), "(uid=j*)".to_string()),
                ("attrs[uid]".to_string(), "*".to_string())
            ],
            pairs
        );
    }

    #[rstest]
    fn when_building_url_from_unusable_endpoint__then_fail() {
        // given
        let endpoint = reqwest::Url::parse("mailto:admin@example.org").unwrap();

        // when
        let error = request_url(&endpoint, &ApiRequest::get(&["token"])).unwrap_err();

        // then
        assert_eq!(ErrorKind::Configuration, error.kind());
    }

    mod when_building_http_request {
        use super::*;

        #[fixture]
        fn endpoint() -> reqwest::Url {
            reqwest::Url::parse("http://fusiondirectory.test/rest.php/v1").unwrap()
        }

        #[rstest]
        fn with_session_token__then_send_it_as_header(endpoint: reqwest::Url) {
            // given
            let request = ApiRequest::patch(&["objects", "user", DN])
                .with_body(json!({"user": {"sn": "Doe"}}))
                .with_session_token("abc123");

            // when
            let http_request = http_request(&reqwest::Client::new(), &endpoint, &request).unwrap();

            // then
            assert_eq!(reqwest::Method::PATCH, *http_request.method());
            assert_eq!(
                Some("abc123"),
                http_request.headers().get(SESSION_TOKEN_HEADER).and_then(|v| v.to_str().ok())
            );
            assert_eq!(
                Some("application/json"),
                http_request.headers().get(reqwest::header::ACCEPT).and_then(|v| v.to_str().ok())
            );
            let body = http_request.body().and_then(|b| b.as_bytes()).unwrap();
            assert_eq!(json!({"user": {"sn": "Doe"}}), serde_json::from_slice::<serde_json::Value>(body).unwrap());
        }

        #[rstest]
        fn without_session_token__then_send_no_header(endpoint: reqwest::Url) {
            // given
            let request = ApiRequest::post(&["login"]);

            // when
            let http_request = http_request(&reqwest::Client::new(), &endpoint, &request).unwrap();

            // then
            assert!(http_request.headers().get(SESSION_TOKEN_HEADER).is_none());
            assert!(http_request.body().is_none());
            assert_eq!("http://fusiondirectory.test/rest.php/v1/login", http_request.url().as_str());
        }
    }
}
