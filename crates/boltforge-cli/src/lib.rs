// ABOUTME: CLI library components for the boltforge binary.
// ABOUTME: Holds the version constant and transcript chunking shared by subcommands.

//! # boltforge-cli
//!
//! ```text
//! boltforge
//! ├── parse <FILE>                  # Print parser events as JSON lines
//! ├── replay <FILE>                 # Stream a transcript through the workbench
//! ├── init                          # Write the default config
//! └── version                       # Show version info
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Inspect what a transcript would do
//! boltforge parse reply.txt
//!
//! # Apply it to a project, 16 bytes at a time, without touching disk
//! boltforge replay reply.txt --workdir ./app --chunk-size 16 --dry-run
//! ```

/// Version of the boltforge CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cumulative prefixes of `text`, growing by roughly `chunk_size` bytes and
/// always ending on a char boundary. The last prefix is the whole text.
pub fn cumulative_prefixes(text: &str, chunk_size: usize) -> Vec<&str> {
    let step = chunk_size.max(1);
    let mut prefixes = Vec::new();
    let mut end = 0;
    while end < text.len() {
        end = (end + step).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        prefixes.push(&text[..end]);
    }
    prefixes
}
