use std::path::PathBuf;

pub const DAEMON_TCP_PORT: u16 = 9877;
/// Session keys come from the command surface and can contain anything.
/// Alphanumerics and '-' pass through; every other byte, '_' included, is
/// written as `_xx` so distinct keys never share a socket.
fn socket_safe(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{:02x}", b));
        }
    }
    out
}

#[cfg(unix)]
pub fn mpv_socket_name(session: &str) -> String {
    format!(
        "{}/encore-mpv-{}.sock",
        std::env::temp_dir().display(),
        socket_safe(session)
    )
}

#[cfg(windows)]
pub fn mpv_socket_name(session: &str) -> String {
    format!("encore-mpv-{}", socket_safe(session))
}

#[cfg(unix)]
pub fn mpv_socket_arg(session: &str) -> String {
    format!("--input-ipc-server={}", mpv_socket_name(session))
}

#[cfg(windows)]
pub fn mpv_socket_arg(session: &str) -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", mpv_socket_name(session))
}

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/encore/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("encore")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("encore")
    }
}

pub fn config_dir() -> PathBuf {
    // On Windows, check for portable config.toml in executable directory first
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                if exe_dir.join("config.toml").exists() {
                    return exe_dir.to_path_buf();
                }
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("encore")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("encore")
    }
}

#[cfg(unix)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv"]
}

#[cfg(windows)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv.exe", "mpv"]
}

#[cfg(unix)]
fn yt_dlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp"]
}

#[cfg(windows)]
fn yt_dlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp.exe", "yt-dlp"]
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    for name in names {
        let p = dir.join(name);
        if p.exists() {
            return Some(p);
        }
        let p = dir.join("external").join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        for name in names {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

/// Find mpv for playback.
///
/// Searches in order:
/// 1. MPV_PATH environment variable
/// 2. Beside current executable
/// 3. PATH
pub fn find_mpv_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MPV_PATH") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }
    find_beside_exe(mpv_binary_names()).or_else(|| find_on_path(mpv_binary_names()))
}

/// Find yt-dlp for search and resolve.  Same search order as mpv, with the
/// YT_DLP_PATH override.
pub fn find_yt_dlp_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("YT_DLP_PATH") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }
    find_beside_exe(yt_dlp_binary_names()).or_else(|| find_on_path(yt_dlp_binary_names()))
}
