use crate::{Error, Result};

use std::collections::HashMap;

/// A parsed field filter: dotted paths selecting which fields a read
/// renders.
///
/// Plain paths include (`"firstName,films.title"`), `!`-prefixed paths
/// exclude (`"!lastUpdate"`). Both may appear in one filter; excludes
/// apply after includes. Paths that match no field are ignored. Filters
/// only shape the rendered document. They never affect checksums, writes,
/// or which rows match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldFilter {
    include: Option<PathNode>,
    exclude: Option<PathNode>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct PathNode {
    /// The path ends here, so the whole subtree is named.
    leaf: bool,
    children: HashMap<String, PathNode>,
}

impl FieldFilter {
    /// A filter that renders everything.
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses a comma-separated path list, as it arrives in a query
    /// parameter.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_paths(text.split(','))
    }

    /// Builds a filter from individual path strings, each optionally
    /// `!`-prefixed.
    pub fn from_paths<I>(paths: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut filter = Self::default();
        for raw in paths {
            let token = raw.as_ref().trim();
            if token.is_empty() {
                continue;
            }
            let (excluded, path) = match token.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, token),
            };
            if path.is_empty() {
                return Err(Error::json_input(format!("Invalid field filter path `{token}`")));
            }
            let root = if excluded {
                filter.exclude.get_or_insert_with(PathNode::default)
            } else {
                filter.include.get_or_insert_with(PathNode::default)
            };
            let mut node = root;
            for segment in path.split('.') {
                if segment.is_empty() {
                    return Err(Error::json_input(format!(
                        "Invalid field filter path `{token}`"
                    )));
                }
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.leaf = true;
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    /// The view of this filter at the document root.
    pub fn root(&self) -> FilterView<'_> {
        FilterView {
            include: self.include.as_ref(),
            exclude: self.exclude.as_ref(),
        }
    }
}

/// The filter as seen from one level of the document.
#[derive(Debug, Clone, Copy)]
pub struct FilterView<'a> {
    /// `None` means no inclusion constraint: every field passes.
    include: Option<&'a PathNode>,
    exclude: Option<&'a PathNode>,
}

impl<'a> FilterView<'a> {
    /// A view that renders everything.
    pub fn all() -> Self {
        FilterView {
            include: None,
            exclude: None,
        }
    }

    /// Whether the named field appears at this level.
    pub fn allows(&self, name: &str) -> bool {
        if let Some(exclude) = self.exclude {
            if let Some(child) = exclude.children.get(name) {
                if child.leaf {
                    return false;
                }
            }
        }
        match self.include {
            None => true,
            Some(include) => include.children.contains_key(name),
        }
    }

    /// The view for the subtree under the named field.
    pub fn descend(&self, name: &str) -> FilterView<'a> {
        let include = self.include.and_then(|node| {
            let child = node.children.get(name)?;
            // A leaf names the whole subtree, lifting the constraint.
            if child.leaf || child.children.is_empty() {
                None
            } else {
                Some(child)
            }
        });
        let exclude = self
            .exclude
            .and_then(|node| node.children.get(name))
            .filter(|child| !child.children.is_empty());
        FilterView { include, exclude }
    }
}
