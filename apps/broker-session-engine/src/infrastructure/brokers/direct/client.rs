//! Thin client for the direct-auth broker. Owns transport only.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api_types::{
    LoginRequest, LoginResponse, LoginSession, LogoutRequest, STAT_OK, StatusResponse,
    UserDetailsRequest, UserDetailsResponse, UserProfile,
};
use super::config::DirectAuthConfig;
use crate::infrastructure::brokers::error::TransportError;
use crate::infrastructure::brokers::http::{build_client, read_json};

/// Broker-native operations used by the direct-auth adapter.
#[async_trait]
pub trait DirectAuthClient: Send + Sync {
    /// Full login with hashed credentials and a TOTP code.
    async fn login(&self, request: &LoginRequest) -> Result<LoginSession, TransportError>;

    /// Cheap authenticated call used to probe the session.
    async fn user_details(&self, user_id: &str, token: &str)
    -> Result<UserProfile, TransportError>;

    /// Invalidate the session server-side.
    async fn logout(&self, user_id: &str, token: &str) -> Result<(), TransportError>;
}

/// reqwest implementation of [`DirectAuthClient`].
#[derive(Debug, Clone)]
pub struct HttpDirectAuthClient {
    client: Client,
    config: DirectAuthConfig,
}

impl HttpDirectAuthClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if the HTTP client cannot be built.
    pub fn new(config: DirectAuthConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(config.timeout())?,
            config,
        })
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
        token: Option<&str>,
    ) -> Result<T, TransportError> {
        let json = serde_json::to_string(payload)?;
        let body = match token {
            Some(token) => format!("jData={json}&jKey={token}"),
            None => format!("jData={json}"),
        };

        let response = self
            .client
            .post(self.config.endpoint(path))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;
        read_json(response).await
    }
}

fn check_stat(stat: &str, emsg: Option<String>) -> Result<(), TransportError> {
    if stat == STAT_OK {
        Ok(())
    } else {
        Err(TransportError::Rejected(
            emsg.unwrap_or_else(|| format!("Broker returned stat {stat}")),
        ))
    }
}

#[async_trait]
impl DirectAuthClient for HttpDirectAuthClient {
    async fn login(&self, request: &LoginRequest) -> Result<LoginSession, TransportError> {
        let response: LoginResponse = self.post("QuickAuth", request, None).await?;
        check_stat(&response.stat, response.emsg)?;

        let token = response
            .susertoken
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TransportError::Decode("login response missing susertoken".into()))?;

        Ok(LoginSession {
            token,
            account_id: response.actid.unwrap_or_else(|| request.uid.clone()),
            name: response.uname.unwrap_or_else(|| request.uid.clone()),
            email: response.email,
            exchanges: response.exarr,
            products: response.prarr.into_iter().map(|p| p.prd).collect(),
        })
    }

    async fn user_details(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<UserProfile, TransportError> {
        let request = UserDetailsRequest {
            uid: user_id.to_string(),
        };
        let response: UserDetailsResponse =
            self.post("UserDetails", &request, Some(token)).await?;
        check_stat(&response.stat, response.emsg)?;

        Ok(UserProfile {
            account_id: response.actid,
            name: response.uname,
            email: response.email,
            exchanges: response.exarr,
        })
    }

    async fn logout(&self, user_id: &str, token: &str) -> Result<(), TransportError> {
        let request = LogoutRequest {
            uid: user_id.to_string(),
        };
        let response: StatusResponse = self.post("Logout", &request, Some(token)).await?;
        check_stat(&response.stat, response.emsg)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn login_request() -> LoginRequest {
        LoginRequest {
            uid: "FA1".into(),
            pwd: "hashed".into(),
            factor2: "123456".into(),
            vc: "FA1_U".into(),
            appkey: "key".into(),
            imei: "abc".into(),
            apkversion: "1.0.0".into(),
            source: "API".into(),
        }
    }

    async fn client_for(server: &MockServer) -> HttpDirectAuthClient {
        HttpDirectAuthClient::new(DirectAuthConfig::new(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn login_success_maps_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/QuickAuth"))
            .and(body_string_contains("\"uid\":\"FA1\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stat": "Ok",
                "susertoken": "tok-1",
                "uname": "Jane Trader",
                "actid": "FA1",
                "exarr": ["NSE", "BSE"],
                "prarr": [{"prd": "C"}, {"prd": "I"}]
            })))
            .mount(&server)
            .await;

        let session = client_for(&server).await.login(&login_request()).await.unwrap();
        assert_eq!(session.token, "tok-1");
        assert_eq!(session.name, "Jane Trader");
        assert_eq!(session.exchanges, vec!["NSE", "BSE"]);
        assert_eq!(session.products, vec!["C", "I"]);
    }

    #[tokio::test]
    async fn login_rejection_surfaces_broker_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/QuickAuth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stat": "Not_Ok",
                "emsg": "Invalid Input : Wrong Password"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .login(&login_request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected("Invalid Input : Wrong Password".into())
        );
    }

    #[tokio::test]
    async fn user_details_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/UserDetails"))
            .and(body_string_contains("jKey=tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stat": "Ok",
                "uname": "Jane Trader",
                "actid": "FA1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = client_for(&server)
            .await
            .user_details("FA1", "tok-1")
            .await
            .unwrap();
        assert_eq!(profile.account_id.as_deref(), Some("FA1"));
    }

    #[tokio::test]
    async fn server_error_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Logout"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .logout("FA1", "tok-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http { status: 502, .. }));
    }
}
