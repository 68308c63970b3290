// FileSystem capability (spec.md §4.10) consumed by `read_files`,
// `write_files`, and the `conditional` step's file predicates.

use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;

/// Minimal file I/O surface the core requires. Concrete globbing/temp-file
/// helpers stay external; this trait exists so step implementations never
/// call `tokio::fs` directly and can be driven against an in-memory
/// filesystem in tests.
#[async_trait]
pub trait FileSystem: Send + Sync {
	async fn exists(&self, path: &str) -> bool;

	async fn read_text(&self, path: &str) -> std::io::Result<String>;

	async fn write_text(&self, path: &str, content: &str) -> std::io::Result<()>;

	async fn mkdirs(&self, path: &str) -> std::io::Result<()>;

	/// Resolve a leading `~` against the user's home directory.
	fn expand_user(&self, path: &str) -> String;

	/// Last-modified time, used by the `conditional` step's `is_newer`.
	async fn modified_time(&self, path: &str) -> std::io::Result<SystemTime>;
}

/// Default `FileSystem` backed by `fs-err`-wrapped `tokio::fs`, matching
/// the teacher's own choice of `fs_err::tokio` for registry file I/O
/// (`mcp/registry/client.rs`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
	async fn exists(&self, path: &str) -> bool {
		let expanded = self.expand_user(path);
		fs_err::tokio::metadata(expanded).await.is_ok()
	}

	async fn read_text(&self, path: &str) -> std::io::Result<String> {
		let expanded = self.expand_user(path);
		fs_err::tokio::read_to_string(expanded).await.map_err(Into::into)
	}

	async fn write_text(&self, path: &str, content: &str) -> std::io::Result<()> {
		let expanded = self.expand_user(path);
		if let Some(parent) = Path::new(&expanded).parent() {
			if !parent.as_os_str().is_empty() {
				fs_err::tokio::create_dir_all(parent).await?;
			}
		}
		fs_err::tokio::write(expanded, content).await.map_err(Into::into)
	}

	async fn mkdirs(&self, path: &str) -> std::io::Result<()> {
		let expanded = self.expand_user(path);
		fs_err::tokio::create_dir_all(expanded).await.map_err(Into::into)
	}

	fn expand_user(&self, path: &str) -> String {
		shellexpand::tilde(path).into_owned()
	}

	async fn modified_time(&self, path: &str) -> std::io::Result<SystemTime> {
		let expanded = self.expand_user(path);
		let metadata = fs_err::tokio::metadata(expanded).await?;
		metadata.modified().map_err(Into::into)
	}
}
