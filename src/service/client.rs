use crate::common::config::ApiConfig;
use crate::common::{FaceAttendError, Result};
use crate::core::pose::CaptureKind;
use crate::core::submit::{PhotoPart, VerificationReply, Verifier};
use crate::service::protocol::{
    error_message, AttendanceRecord, LoginRequest, TokenResponse, UserProfile, CHECK_IN_PATH,
    ENROLL_FACE_PATH, HISTORY_PATH, LOGIN_PATH, PROFILE_PATH,
};
use crate::storage::AuthStore;
use reqwest::blocking::{multipart, Client, Response};
use reqwest::StatusCode;

/// Blocking client for the attendance backend. Owns the auth store so a
/// rejected token can be cleared where it is detected.
pub struct ApiClient {
    base_url: String,
    client: Client,
    auth: AuthStore,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, auth: AuthStore) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("faceattend/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            auth,
        })
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<String> {
        self.auth
            .token()
            .map(str::to_string)
            .ok_or(FaceAttendError::Unauthorized)
    }

    /// Map non-2xx responses to errors. A 401 on an authenticated call means
    /// the stored token is dead, so it is dropped.
    fn check(&mut self, response: Response, authenticated: bool) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED && authenticated {
            tracing::warn!("Backend rejected the stored token, clearing session");
            self.auth.logout()?;
            return Err(FaceAttendError::Unauthorized);
        }

        let code = status.as_u16();
        let body = response.text().unwrap_or_default();
        let message = error_message(code, &body);
        tracing::debug!("Request failed with {}: {}", code, message);
        Err(FaceAttendError::Api { status: code, message })
    }

    /// Exchange credentials for a token, then fetch and store the profile.
    pub fn login(&mut self, username: &str, password: &str) -> Result<UserProfile> {
        let request = LoginRequest {
            nama_pengguna: username.to_string(),
            kata_sandi: password.to_string(),
        };

        tracing::info!("Logging in as {}", username);
        let response = self.client.post(self.url(LOGIN_PATH)).json(&request).send()?;
        let token: TokenResponse = self.check(response, false)?.json()?;
        self.auth.set_token(token.token_akses)?;

        self.profile()
    }

    pub fn profile(&mut self) -> Result<UserProfile> {
        let token = self.bearer()?;
        let response = self.client.get(self.url(PROFILE_PATH)).bearer_auth(token).send()?;
        let profile: UserProfile = self.check(response, true)?.json()?;
        self.auth.set_user(profile.clone())?;
        Ok(profile)
    }

    pub fn attendance_history(&mut self) -> Result<Vec<AttendanceRecord>> {
        let token = self.bearer()?;
        let response = self.client.get(self.url(HISTORY_PATH)).bearer_auth(token).send()?;
        Ok(self.check(response, true)?.json()?)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.auth.logout()
    }
}

impl Verifier for ApiClient {
    fn verify(&mut self, kind: CaptureKind, photos: &[PhotoPart]) -> Result<VerificationReply> {
        let path = match kind {
            CaptureKind::CheckIn => CHECK_IN_PATH,
            CaptureKind::Enrollment => ENROLL_FACE_PATH,
        };
        let token = self.bearer()?;

        let mut form = multipart::Form::new();
        for photo in photos {
            let part = multipart::Part::bytes(photo.bytes.clone())
                .file_name(photo.file_name.clone())
                .mime_str("image/jpeg")?;
            form = form.part(photo.field.clone(), part);
        }

        tracing::debug!("POST {} with {} photo(s)", path, photos.len());
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .multipart(form)
            .send()?;
        Ok(self.check(response, true)?.json()?)
    }
}
