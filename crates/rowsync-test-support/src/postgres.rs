//! Disposable Postgres databases for integration tests, without Docker.

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use postgres::{Client, Config, NoTls};
use url::Url;

/// Environment variable naming an existing server to create test databases on.
pub const DATABASE_URL_ENV: &str = "ROWSYNC_TEST_DATABASE_URL";

/// A uniquely named database, dropped together with any server spawned for it.
pub struct TestDatabase {
    url: String,
    admin_url: String,
    name: String,
    _server: Option<LocalServer>,
}

struct LocalServer {
    process: Child,
    data_dir: PathBuf,
}

impl TestDatabase {
    /// Connection string of the test database.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a new client on the test database.
    ///
    /// # Errors
    ///
    /// Returns an error when the server refuses the connection.
    pub fn connect(&self) -> Result<Client> {
        connect(&self.url).context("failed to connect to test database")
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        if let Ok(mut admin) = connect(&self.admin_url) {
            let _ = admin.simple_query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.name));
        }
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
        let _ = fs::remove_dir_all(&self.data_dir);
    }
}

/// Create a fresh database for one test.
///
/// Uses the server named by [`DATABASE_URL_ENV`] when set; otherwise spawns a
/// throwaway cluster from locally installed `initdb`/`postgres` binaries.
/// Callers skip their test when this returns an error.
///
/// # Errors
///
/// Returns an error when no server is configured and the local binaries are
/// missing or fail to start.
pub fn start_postgres() -> Result<TestDatabase> {
    if let Ok(base) = std::env::var(DATABASE_URL_ENV) {
        return create_database(&base, None);
    }
    let (server, base) = spawn_local_server()?;
    create_database(&base, Some(server))
}

fn create_database(base: &str, server: Option<LocalServer>) -> Result<TestDatabase> {
    let parsed = Url::parse(base).context("invalid postgres connection url")?;
    let name = unique_name();

    let mut admin = parsed.clone();
    admin.set_path("/postgres");
    let mut candidates = vec![admin.to_string()];
    if admin.path() != parsed.path() {
        candidates.push(parsed.to_string());
    }

    let mut last_error = None;
    for admin_url in candidates {
        let created = connect(&admin_url).and_then(|mut client| {
            client
                .simple_query(&format!("CREATE DATABASE \"{name}\""))
                .map(drop)
                .context("failed to issue CREATE DATABASE")
        });
        match created {
            Ok(()) => {
                let mut url = parsed;
                url.set_path(&format!("/{name}"));
                return Ok(TestDatabase {
                    url: url.to_string(),
                    admin_url,
                    name,
                    _server: server,
                });
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("failed to create test database")))
}

fn connect(url: &str) -> Result<Client> {
    Ok(Config::from_str(url)?.connect(NoTls)?)
}

fn spawn_local_server() -> Result<(LocalServer, String)> {
    let initdb = find_binary("initdb")?;
    let postgres = find_binary("postgres")?;
    let pg_isready = find_binary("pg_isready")?;

    let port = free_port()?;
    let data_dir = scratch_dir()?;
    let data = data_dir
        .to_str()
        .context("data dir contains non-utf8 characters")?;

    let status = Command::new(&initdb)
        .args(["-D", data, "--username=postgres", "--auth=trust"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("failed to run initdb")?;
    if !status.success() {
        bail!("initdb exited with failure status");
    }

    let process = Command::new(&postgres)
        .args(["-D", data, "-p", &port.to_string(), "-h", "127.0.0.1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to start postgres process")?;
    let server = LocalServer { process, data_dir };

    wait_until_ready(&pg_isready, port)?;
    Ok((server, format!("postgres://postgres@127.0.0.1:{port}/postgres")))
}

fn find_binary(name: &str) -> Result<PathBuf> {
    let mut dirs: Vec<PathBuf> = ["/usr/lib/postgresql/16/bin", "/opt/homebrew/opt/postgresql@16/bin"]
        .iter()
        .map(PathBuf::from)
        .collect();
    if let Some(paths) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&paths));
    }
    dirs.into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| anyhow!("{name} binary is required for Postgres tests"))
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("failed to reserve port")?;
    Ok(listener
        .local_addr()
        .context("failed to read listener address")?
        .port())
}

fn scratch_dir() -> Result<PathBuf> {
    let base = std::env::temp_dir().join("rowsync-pg");
    for attempt in 0..5 {
        let candidate = base.join(format!("{}-{attempt}", unique_name()));
        if !candidate.exists() {
            fs::create_dir_all(&candidate)
                .with_context(|| format!("failed to create data dir {}", candidate.display()))?;
            return Ok(candidate);
        }
    }
    bail!("failed to allocate temporary data directory for postgres");
}

fn wait_until_ready(pg_isready: &Path, port: u16) -> Result<()> {
    for _ in 0..30 {
        let ready = Command::new(pg_isready)
            .args(["-h", "127.0.0.1", "-p", &port.to_string(), "-U", "postgres"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success());
        if ready {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(200));
    }
    bail!("postgres process did not become ready in time")
}

fn unique_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("rowsync_test_{}_{nanos}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_are_valid_identifiers() {
        let name = unique_name();
        assert!(name.starts_with("rowsync_test_"));
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn missing_binaries_are_reported() {
        let err = find_binary("definitely-not-a-postgres-binary").expect_err("missing");
        assert!(err.to_string().contains("required for Postgres tests"));
    }
}
