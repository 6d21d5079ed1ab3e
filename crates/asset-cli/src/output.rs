//! Small formatting helpers shared by the subcommands.

pub fn hex_preview(bytes: &[u8]) -> String {
    let preview: Vec<String> = bytes.iter().take(16).map(|b| format!("{b:02x}")).collect();
    if bytes.len() > 16 {
        format!("{} … ({} bytes total)", preview.join(" "), bytes.len())
    } else {
        preview.join(" ")
    }
}
