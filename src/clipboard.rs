// Clipboard handoff for exports without an explicit save path

use anyhow::{Context, Result};
use std::path::Path;

/// Put a file reference to `path` on the system clipboard.
///
/// Paste targets on Linux and macOS resolve `file://` URIs; Windows shell
/// targets take the bare path.
pub fn copy_path_reference(path: &Path) -> Result<()> {
    let payload = clipboard_payload(path);
    let mut clipboard =
        arboard::Clipboard::new().context("Failed to open the system clipboard")?;
    clipboard
        .set_text(payload)
        .context("Failed to write the export path to the clipboard")?;
    Ok(())
}

fn clipboard_payload(path: &Path) -> String {
    if cfg!(windows) {
        path.display().to_string()
    } else {
        format!("file://{}", path.display())
    }
}
