//! Glyph themes for the dashboard progress bars.

/// Selectable bar style, cycled with the `theme_next` control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Blocks,
    Ascii,
    Dots,
}

impl Theme {
    pub fn next(self) -> Self {
        match self {
            Theme::Blocks => Theme::Ascii,
            Theme::Ascii => Theme::Dots,
            Theme::Dots => Theme::Blocks,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Theme::Blocks => "blocks",
            Theme::Ascii => "ascii",
            Theme::Dots => "dots",
        }
    }

    /// `(filled, empty)` glyphs of the bar body.
    pub fn glyphs(self) -> (char, char) {
        match self {
            Theme::Blocks => ('█', '░'),
            Theme::Ascii => ('#', '-'),
            Theme::Dots => ('⣿', '⣀'),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_visits_every_theme_and_wraps() {
        let mut theme = Theme::default();
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(theme.name());
            theme = theme.next();
        }
        assert_eq!(seen, vec!["blocks", "ascii", "dots"]);
        assert_eq!(theme, Theme::Blocks);
    }
}
