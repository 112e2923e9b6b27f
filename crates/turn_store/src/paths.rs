use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub const STORE_DIR: [&str; 2] = [".agent_terminal", "sessions"];

/// Name of the file holding the session id the next launch should resume.
pub const ACTIVE_SESSION_FILE: &str = "active_session";

#[must_use]
pub fn store_root(cwd: &Path) -> PathBuf {
    cwd.join(STORE_DIR[0]).join(STORE_DIR[1])
}

/// Hex digits of the raw id's SHA-256 kept in each file name.
const ID_HASH_LEN: usize = 12;

/// File name for a session log. Ids are opaque upstream strings, so anything
/// outside `[A-Za-z0-9._-]` is replaced and a digest of the raw id keeps
/// distinct ids apart; the header line keeps the exact id.
#[must_use]
pub fn session_file_name(session_id: &str) -> String {
    let sanitized: String = session_id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    let digest = hex::encode(Sha256::digest(session_id.as_bytes()));
    format!("{sanitized}-{}.jsonl", &digest[..ID_HASH_LEN])
}

#[cfg(test)]
mod tests {
    use super::session_file_name;

    #[test]
    fn file_names_never_escape_the_store_root() {
        for id in ["sess-1", "../etc/passwd", "a b:c"] {
            let name = session_file_name(id);
            assert!(!name.contains('/'), "{name}");
            assert!(!name.starts_with('.'), "{name}");
            assert!(name.ends_with(".jsonl"), "{name}");
        }
        assert!(session_file_name("../etc/passwd").starts_with("_etc_passwd-"));
        assert!(session_file_name("sess-1").starts_with("sess-1-"));
    }

    #[test]
    fn ids_that_sanitize_alike_get_distinct_files() {
        assert_ne!(session_file_name("a/b"), session_file_name("a_b"));
        assert_ne!(session_file_name("a b"), session_file_name("a:b"));
        assert_eq!(session_file_name("a/b"), session_file_name("a/b"));
    }
}
