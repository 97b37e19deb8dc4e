//! Dependency windows: the token sequences the dependency features are read from.

use std::fmt;

use crate::graphs::Path;
use crate::models::Token;

/// Window family, the two-letter code used in feature names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFamily {
    OuterWindow,
    InnerWindow,
    LinearDependency,
    ParseDependency,
}

impl WindowFamily {
    pub fn code(self) -> &'static str {
        match self {
            Self::OuterWindow => "OW",
            Self::InnerWindow => "IW",
            Self::LinearDependency => "LD",
            Self::ParseDependency => "PD",
        }
    }
}

/// A concrete window of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// Tokens before entity 1.
    Ow1,
    /// Tokens before entity 2.
    Ow2,
    /// Tokens after entity 1.
    Iw1,
    /// Tokens after entity 2.
    Iw2,
    /// Tokens between the two entities.
    Ld,
    /// Shortest dependency path between the entity heads.
    Pd,
}

impl WindowKind {
    pub const ALL: [WindowKind; 6] = [
        WindowKind::Ow1,
        WindowKind::Iw1,
        WindowKind::Ow2,
        WindowKind::Iw2,
        WindowKind::Ld,
        WindowKind::Pd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ow1 => "OW1",
            Self::Ow2 => "OW2",
            Self::Iw1 => "IW1",
            Self::Iw2 => "IW2",
            Self::Ld => "LD",
            Self::Pd => "PD",
        }
    }

    pub fn family(self) -> WindowFamily {
        match self {
            Self::Ow1 | Self::Ow2 => WindowFamily::OuterWindow,
            Self::Iw1 | Self::Iw2 => WindowFamily::InnerWindow,
            Self::Ld => WindowFamily::LinearDependency,
            Self::Pd => WindowFamily::ParseDependency,
        }
    }

    /// Which entity the window belongs to, for the per-entity windows.
    pub fn instance(self) -> Option<u8> {
        match self {
            Self::Ow1 | Self::Iw1 => Some(1),
            Self::Ow2 | Self::Iw2 => Some(2),
            Self::Ld | Self::Pd => None,
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A window ready for feature emission.
#[derive(Debug, Clone)]
pub enum DependencyWindow<'s> {
    Tokens {
        kind: WindowKind,
        tokens: Vec<&'s Token>,
    },
    Path(Path<'s>),
}

impl<'s> DependencyWindow<'s> {
    pub fn kind(&self) -> WindowKind {
        match self {
            DependencyWindow::Tokens { kind, .. } => *kind,
            DependencyWindow::Path(_) => WindowKind::Pd,
        }
    }

    pub fn tokens(&self) -> &[&'s Token] {
        match self {
            DependencyWindow::Tokens { tokens, .. } => tokens,
            DependencyWindow::Path(path) => path.tokens(),
        }
    }
}

/// Contiguous groups of `n` items; nothing when `n` is zero or exceeds the input.
pub fn ngrams<T>(items: &[T], n: usize) -> impl Iterator<Item = &[T]> {
    (n > 0).then(|| items.windows(n)).into_iter().flatten()
}
