use rand::seq::SliceRandom;

pub const NAME: &str = "ROM Workbench";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const ALTERNATE_TITLES: &[&str] = &[
    "Byte Smithy",
    "The Pointer Whisperer",
    "Bank Switcher Deluxe",
    "Sprite Wrangler",
    "Checksum Cowboy",
    "Hex Marks the Spot",
    "Tile Map Tinkerer",
];

/// Window title; picks a random alternate name when `alternate` is on.
pub fn window_title(alternate: bool) -> String {
    let name = if alternate {
        ALTERNATE_TITLES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(NAME)
    } else {
        NAME
    };
    format!("{name} {VERSION}")
}

/// Lines shown in the About popup.
pub fn about_lines() -> Vec<String> {
    vec![
        format!("{NAME} {VERSION}"),
        String::new(),
        "Decompile a ROM into an editable project, compile it back,".into(),
        "upgrade old projects, and extract dialogue scripts.".into(),
        String::new(),
        "The heavy lifting is done by the external engine and".into(),
        "dialogue extractor configured in Preferences.".into(),
        String::new(),
        format!("License: {}", env!("CARGO_PKG_LICENSE")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_title_has_name_and_version() {
        assert_eq!(window_title(false), format!("ROM Workbench {VERSION}"));
    }

    #[test]
    fn alternate_title_comes_from_list() {
        let title = window_title(true);
        assert!(title.ends_with(VERSION));
        assert!(ALTERNATE_TITLES.iter().any(|t| title.starts_with(t)));
    }
}
