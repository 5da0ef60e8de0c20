//! Target address forms: CSE-relative (`mobius/ae`), SP-relative
//! (`/mb/mobius/ae`) and absolute (`//sp/mb/mobius/ae`).

/// Where a request target is hosted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locality {
    /// Path (structured, or starting with a resource id) on this CSE
    Local(String),
    /// Another CSE of this service provider; `to` is the SP-relative target
    Remote { csi: String, to: String },
    /// Another service provider domain
    Foreign { sp: String, to: String },
}

/// Names under which this CSE is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CseIdentity {
    /// CSE-ID without the leading slash, e.g. `mb`
    pub csi: String,
    /// Resource name of the CSEBase, e.g. `mobius`
    pub name: String,
    /// SP-ID, e.g. `example.net`
    pub sp: String,
}

impl CseIdentity {
    pub fn new(csi: &str, name: &str, sp: &str) -> Self {
        Self {
            csi: csi.trim_matches('/').to_string(),
            name: name.trim_matches('/').to_string(),
            sp: sp.trim_matches('/').to_string(),
        }
    }

    /// `/mb`
    pub fn sp_relative_id(&self) -> String {
        format!("/{}", self.csi)
    }

    /// `//example.net/mb`
    pub fn absolute_id(&self) -> String {
        format!("//{}/{}", self.sp, self.csi)
    }

    pub fn locate(&self, to: &str) -> Locality {
        let to = to.trim();
        if let Some(rest) = to.strip_prefix("//") {
            let (sp, remainder) = rest.split_once('/').unwrap_or((rest, ""));
            if sp != self.sp {
                return Locality::Foreign {
                    sp: sp.to_string(),
                    to: to.to_string(),
                };
            }
            return self.locate(&format!("/{}", remainder));
        }
        if let Some(rest) = to.strip_prefix('/') {
            let (csi, remainder) = rest.split_once('/').unwrap_or((rest, ""));
            if csi != self.csi {
                return Locality::Remote {
                    csi: csi.to_string(),
                    to: to.to_string(),
                };
            }
            let remainder = remainder.trim_end_matches('/');
            return Locality::Local(if remainder.is_empty() {
                self.name.clone()
            } else {
                remainder.to_string()
            });
        }
        Locality::Local(to.trim_end_matches('/').to_string())
    }
}
