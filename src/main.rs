use faceattend::{
    cli::{self, diagnostics},
    common::{CaptureModeSetting, Config, DevMode},
    core::{CaptureKind, CaptureMode},
    service::ApiClient,
    storage::AuthStore,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "faceattend")]
#[command(about = "Face-verified attendance check-in client")]
struct Cli {
    /// Enable development mode (keeps config, session and captures under ./dev_data)
    #[arg(long, global = true)]
    dev: bool,

    /// Use this config file instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token
    Login {
        #[arg(short, long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Check in with 3 photos
    CheckIn {
        /// Take each photo by key press instead of automatically
        #[arg(long)]
        manual: bool,
    },
    /// Register your face with 5 photos
    Enroll {
        /// Let the detector take the photos
        #[arg(long)]
        auto: bool,
    },
    /// Show attendance history
    History,
    /// List cameras and show which one auto-detect picks
    DetectCamera,
    /// Save one frame from the camera
    TestCamera,
    /// Save a frame annotated with detected faces
    TestDetection,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;
    let config = Config::load(cli.config.as_deref(), &dev_mode)?;

    match cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            let mut client = api_client(&config, &dev_mode)?;
            let profile = client.login(&username, &password)?;
            println!("✅ Logged in as {} ({})", profile.full_name(), profile.id_karyawan);
            if !profile.sudah_daftar_wajah {
                println!("   Your face is not registered yet. Run `faceattend enroll` first.");
            }
        }
        Commands::Logout => {
            let mut store = AuthStore::open_with_dev_mode(&dev_mode)?;
            store.logout()?;
            println!("Logged out.");
        }
        Commands::Whoami => {
            let mut client = logged_in_client(&config, &dev_mode)?;
            let profile = client.profile()?;
            println!("{} (@{})", profile.full_name(), profile.nama_pengguna);
            println!("  Employee ID:     {}", profile.id_karyawan);
            println!("  Position:        {}", profile.jabatan);
            println!("  Role:            {}", profile.role());
            println!("  Face registered: {}", if profile.sudah_daftar_wajah { "yes" } else { "no" });
            if !profile.status_kehadiran.is_empty() {
                println!("  Status:          {}", profile.status_kehadiran);
            }
            if let Some(note) = profile.catatan_admin.as_deref().filter(|n| !n.is_empty()) {
                println!("  Admin note:      {}", note);
            }
        }
        Commands::CheckIn { manual } => {
            let mode = if manual {
                CaptureMode::Manual
            } else {
                configured_mode(&config)
            };
            let mut client = logged_in_client(&config, &dev_mode)?;
            cli::run_capture(&config, CaptureKind::CheckIn, mode, &mut client)?;
        }
        Commands::Enroll { auto } => {
            let mode = if auto {
                CaptureMode::Automatic { cooldown: config.capture.cooldown() }
            } else {
                CaptureMode::Manual
            };
            let mut client = logged_in_client(&config, &dev_mode)?;
            cli::run_capture(&config, CaptureKind::Enrollment, mode, &mut client)?;
        }
        Commands::History => {
            let mut client = logged_in_client(&config, &dev_mode)?;
            let records = client.attendance_history()?;
            if records.is_empty() {
                println!("No attendance records yet.");
            }
            for record in records {
                println!("{}  {}  {}", record.tanggal, record.jam, record.status);
            }
        }
        Commands::DetectCamera => {
            println!("🔍 Detecting available cameras...\n");
            diagnostics::detect_cameras(&config)?;
        }
        Commands::TestCamera => {
            println!("Testing camera...");
            diagnostics::test_camera(&config, &dev_mode)?;
        }
        Commands::TestDetection => {
            println!("Testing face detection...");
            diagnostics::test_detection(&config, &dev_mode)?;
        }
    }

    Ok(())
}

fn configured_mode(config: &Config) -> CaptureMode {
    match config.capture.mode {
        CaptureModeSetting::Manual => CaptureMode::Manual,
        CaptureModeSetting::Automatic => CaptureMode::Automatic { cooldown: config.capture.cooldown() },
    }
}

fn api_client(config: &Config, dev_mode: &DevMode) -> Result<ApiClient> {
    let store = AuthStore::open_with_dev_mode(dev_mode)?;
    Ok(ApiClient::new(&config.api, store)?)
}

fn logged_in_client(config: &Config, dev_mode: &DevMode) -> Result<ApiClient> {
    let client = api_client(config, dev_mode)?;
    if !client.auth().is_logged_in() {
        bail!("Not logged in. Run `faceattend login -u <username>` first.");
    }
    Ok(client)
}

fn read_password() -> Result<String> {
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
