use crate::primitive::ResourceType;
use std::fmt;

/// Virtual child resources addressed by a trailing path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualResource {
    /// Newest contentInstance of a container
    Latest,
    /// Oldest contentInstance of a container
    Oldest,
    /// Member fan-out of a group
    FanOutPoint,
}

impl VirtualResource {
    pub fn short_name(self) -> &'static str {
        match self {
            VirtualResource::Latest => "la",
            VirtualResource::Oldest => "ol",
            VirtualResource::FanOutPoint => "fopt",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "la" | "latest" => Some(VirtualResource::Latest),
            "ol" | "oldest" => Some(VirtualResource::Oldest),
            "fopt" | "fanOutPoint" => Some(VirtualResource::FanOutPoint),
            _ => None,
        }
    }

    /// Parent types under which this virtual resource exists.
    pub fn allowed_under(self, parent: ResourceType) -> bool {
        match self {
            VirtualResource::Latest | VirtualResource::Oldest => {
                matches!(parent, ResourceType::Container | ResourceType::TimeSeries)
            }
            VirtualResource::FanOutPoint => parent == ResourceType::Group,
        }
    }

    /// Splits `path` into its base and trailing virtual resource, if any.
    pub fn split(path: &str) -> (&str, Option<Self>) {
        match path.rsplit_once('/') {
            Some((base, last)) => match Self::from_segment(last) {
                Some(vr) => (base, Some(vr)),
                None => (path, None),
            },
            None => (path, None),
        }
    }

    /// Rewrites a long trailing segment (`/latest`) to its short form (`/la`).
    pub fn normalize(path: &str) -> String {
        match Self::split(path) {
            (base, Some(vr)) => format!("{}/{}", base, vr.short_name()),
            (_, None) => path.to_string(),
        }
    }
}

impl fmt::Display for VirtualResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
