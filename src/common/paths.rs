use std::path::PathBuf;

// Production locations. Dev mode redirects everything under ./dev_data instead.

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/faceattend/faceattend.toml")
}

pub fn system_models_dir() -> PathBuf {
    PathBuf::from("/usr/share/faceattend/models")
}

pub fn system_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "faceattend", "FaceAttend")
        .map(|dirs| dirs.data_dir().to_path_buf())
}
