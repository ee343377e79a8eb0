use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::core::submit::VerificationReply;

// Endpoints, relative to the configured base URL
pub const LOGIN_PATH: &str = "/autentikasi/masuk";
pub const PROFILE_PATH: &str = "/profil/saya";
pub const ENROLL_FACE_PATH: &str = "/profil/daftar-wajah";
pub const CHECK_IN_PATH: &str = "/absensi/cek-masuk";
pub const HISTORY_PATH: &str = "/absensi/riwayat";

#[derive(Serialize, Debug, Clone)]
pub struct LoginRequest {
    pub nama_pengguna: String,
    pub kata_sandi: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    #[serde(alias = "access_token")]
    pub token_akses: String,
    #[serde(alias = "token_type", default = "default_token_type")]
    pub tipe_token: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Employee,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Employee => write!(f, "employee"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id_pengguna: i64,
    pub nama_pengguna: String,
    pub nama_depan: String,
    pub nama_belakang: String,
    pub id_karyawan: String,
    pub jabatan: String,
    pub alamat_surel: String,
    #[serde(default)]
    pub nik: Option<String>,
    #[serde(default)]
    pub sudah_daftar_wajah: bool,
    #[serde(default)]
    pub status_kehadiran: String,
    #[serde(default)]
    pub catatan_admin: Option<String>,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.nama_depan, self.nama_belakang).trim().to_string()
    }

    pub fn role(&self) -> Role {
        if self.jabatan.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Employee
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    /// `YYYY-MM-DD`
    pub tanggal: String,
    /// `HH:MM:SS`
    pub jam: String,
    pub status: String,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Validation(Vec<ValidationItem>),
}

#[derive(Deserialize, Debug)]
struct ValidationItem {
    msg: String,
}

/// Human-readable message from an error response body. The backend sends
/// `{"detail": "..."}` or a validation list `{"detail": [{"msg": ...}]}`.
pub fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { detail: ErrorDetail::Message(message) }) => message,
        Ok(ErrorBody { detail: ErrorDetail::Validation(items) }) if !items.is_empty() => items
            .into_iter()
            .map(|item| item.msg)
            .collect::<Vec<_>>()
            .join("; "),
        _ if !body.trim().is_empty() && body.len() <= 200 => body.trim().to_string(),
        _ => format!("request failed with status {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_accepts_both_field_spellings() {
        let native: TokenResponse =
            serde_json::from_str(r#"{"token_akses": "abc", "tipe_token": "bearer"}"#).unwrap();
        let aliased: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc", "token_type": "bearer"}"#).unwrap();
        assert_eq!(native, aliased);

        let bare: TokenResponse = serde_json::from_str(r#"{"token_akses": "xyz"}"#).unwrap();
        assert_eq!(bare.tipe_token, "bearer");
    }

    #[test]
    fn profile_derives_role_and_name() {
        let json = r#"{
            "id_pengguna": 7,
            "nama_pengguna": "sari",
            "nama_depan": "Sari",
            "nama_belakang": "Wulandari",
            "id_karyawan": "EMP-007",
            "jabatan": "Admin",
            "alamat_surel": "sari@example.com",
            "nik": null,
            "sudah_daftar_wajah": true,
            "status_kehadiran": "Hadir",
            "catatan_admin": null
        }"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.full_name(), "Sari Wulandari");
        assert_eq!(profile.role(), Role::Admin);
        assert!(profile.sudah_daftar_wajah);
    }

    #[test]
    fn error_detail_string_and_list() {
        assert_eq!(
            error_message(400, r#"{"detail": "Anda sudah absen hari ini!"}"#),
            "Anda sudah absen hari ini!"
        );
        assert_eq!(
            error_message(422, r#"{"detail": [{"msg": "field required"}, {"msg": "too short"}]}"#),
            "field required; too short"
        );
        assert_eq!(error_message(502, ""), "request failed with status 502");
    }
}
