//! Filter-criteria evaluation shared by every store backend.

use crate::primitive::{FilterCriteria, SortType};
use crate::resource::Resource;
use serde_json::Value;

/// Whether `res` satisfies every condition in `fc`.
pub fn matches(res: &Resource, fc: &FilterCriteria) -> bool {
    if let Some(crb) = &fc.crb {
        if res.ct >= *crb {
            return false;
        }
    }
    if let Some(cra) = &fc.cra {
        if res.ct < *cra {
            return false;
        }
    }
    if let Some(us) = &fc.us {
        if res.lt >= *us {
            return false;
        }
    }
    if let Some(ms) = &fc.ms {
        if res.lt < *ms {
            return false;
        }
    }
    if let Some(sts) = fc.sts {
        if res.st.map_or(true, |st| st >= sts) {
            return false;
        }
    }
    if let Some(stb) = fc.stb {
        if res.st.map_or(true, |st| st < stb) {
            return false;
        }
    }
    if let Some(exb) = &fc.exb {
        if res.et.map_or(true, |et| et >= *exb) {
            return false;
        }
    }
    if let Some(exa) = &fc.exa {
        if res.et.map_or(true, |et| et < *exa) {
            return false;
        }
    }
    if !fc.ty.is_empty() && !fc.ty.contains(&res.ty) {
        return false;
    }
    if !fc.lbl.is_empty()
        && !fc
            .lbl
            .iter()
            .any(|wanted| res.lbl.iter().any(|label| label.contains(wanted.as_str())))
    {
        return false;
    }
    if fc.sza.is_some() || fc.szb.is_some() {
        let Some(cs) = res.content_size() else {
            return false;
        };
        if fc.sza.map_or(false, |sza| cs < sza) || fc.szb.map_or(false, |szb| cs >= szb) {
            return false;
        }
    }
    if !fc.cty.is_empty() {
        let Some(cin) = res.content_instance() else {
            return false;
        };
        if !fc.cty.iter().any(|cty| cin.cnf.starts_with(cty.as_str())) {
            return false;
        }
    }
    if !fc.attributes.is_empty() {
        let map = res.to_map();
        for (key, wanted) in &fc.attributes {
            let Some(actual) = map.get(key) else {
                return false;
            };
            if !attribute_matches(actual, wanted) {
                return false;
            }
        }
    }
    true
}

fn attribute_matches(actual: &Value, wanted: &Value) -> bool {
    let wanted = scalar_text(wanted);
    match actual {
        Value::Array(items) => items.iter().any(|item| wildcard_match(&wanted, &scalar_text(item))),
        other => wildcard_match(&wanted, &scalar_text(other)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Glob match where `*` stands for any run of characters.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return true,
    };
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return remaining.is_empty(),
    };
    for part in middle {
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}

/// Number of path segments of `path` below `base`.
pub fn depth_below(base: &str, path: &str) -> Option<usize> {
    if base.is_empty() {
        return Some(path.split('/').count());
    }
    let rest = path.strip_prefix(base)?.strip_prefix('/')?;
    Some(rest.split('/').count())
}

/// Whether `path` lies strictly under `base`.
pub fn is_descendant(base: &str, path: &str) -> bool {
    depth_below(base, path).is_some()
}

/// Orders discovery results: by path unless `dst` asks for creation order.
/// `seq` breaks ties between records created within the same second.
pub fn sort_discovered(records: &mut [(u64, Resource)], dst: Option<SortType>) {
    match dst {
        None => records.sort_by(|a, b| a.1.path.cmp(&b.1.path)),
        Some(SortType::Ascending) => records.sort_by(|a, b| (a.1.ct, a.0).cmp(&(b.1.ct, b.0))),
        Some(SortType::Descending) => records.sort_by(|a, b| (b.1.ct, b.0).cmp(&(a.1.ct, a.0))),
    }
}

/// Applies `ofst`/`lim` paging to an already ordered list.
pub fn page<T>(items: Vec<T>, fc: &FilterCriteria) -> Vec<T> {
    let skip = fc.skip();
    match fc.lim {
        Some(lim) => items.into_iter().skip(skip).take(lim).collect(),
        None => items.into_iter().skip(skip).collect(),
    }
}
