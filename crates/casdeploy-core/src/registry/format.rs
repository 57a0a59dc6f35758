//! Text format of the registry file.
//!
//! ```text
//! version=19.3.0
//! # This config was automatically generated
//! [caches]
//! 1	/dev/nvme0n1	WB	cleaning_policy=acp,cache_line_size=8
//! [cores]
//! 1	1	/dev/sda
//! ```

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use super::{Insertion, Registry};
use crate::types::{CacheConfig, CleaningPolicy, CoreConfig, LineSize, PromotionPolicy};

const FORMAT_HEADER: &str = "# This config was automatically generated";

const SECTION_CACHES: &str = "[caches]";
const SECTION_CORES: &str = "[cores]";
const VERSION_PREFIX: &str = "version=";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Caches,
    Cores,
}

/// Parse registry text. The error string describes the first offending line.
pub fn parse_registry(content: &str) -> Result<Registry, String> {
    let mut section = Section::Preamble;
    let mut version_tag: Option<String> = None;
    let mut caches = Vec::new();
    let mut cores = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split('#').next().unwrap_or_default().trim_end();
        if line.trim().is_empty() {
            continue;
        }

        match line.trim() {
            SECTION_CACHES => {
                section = Section::Caches;
                continue;
            }
            SECTION_CORES => {
                section = Section::Cores;
                continue;
            }
            _ => {}
        }

        let at = |e: String| format!("line {}: {}", line_no, e);
        match section {
            Section::Preamble => {
                let Some(tag) = line.trim().strip_prefix(VERSION_PREFIX) else {
                    return Err(at(format!("unexpected content '{}'", line.trim())));
                };
                version_tag = Some(tag.trim().to_string());
            }
            Section::Caches => caches.push(parse_cache_line(line).map_err(at)?),
            Section::Cores => cores.push(parse_core_line(line).map_err(at)?),
        }
    }

    let version_tag = match version_tag {
        Some(tag) if !tag.is_empty() => tag,
        _ => return Err("no or invalid version tag".to_string()),
    };

    let mut registry = Registry::new(version_tag);
    for cache in caches {
        let id = cache.cache_id;
        if registry.caches.contains_key(&id) {
            return Err(format!("cache id {} configured more than once", id));
        }
        if let Insertion::Conflict(reason) = registry.insert_cache(cache) {
            return Err(reason);
        }
    }
    let mut keys = HashSet::new();
    for core in cores {
        if !keys.insert((core.cache_id, core.core_id)) {
            return Err(format!(
                "core {}-{} configured more than once",
                core.cache_id, core.core_id
            ));
        }
        if let Insertion::Conflict(reason) = registry.insert_core(core) {
            return Err(reason);
        }
    }

    Ok(registry)
}

fn columns(line: &str) -> Result<Vec<&str>, String> {
    let values: Vec<&str> = line.split_whitespace().collect();
    match values.len() {
        0..=2 => Err("too few columns".to_string()),
        3 | 4 => Ok(values),
        _ => Err("too many columns".to_string()),
    }
}

fn parse_id(value: &str, what: &str) -> Result<u16, String> {
    value
        .parse()
        .map_err(|_| format!("{} is invalid {}", value, what))
}

fn parse_params(value: &str) -> Result<Vec<(String, String)>, String> {
    let mut seen = HashSet::new();
    let mut params = Vec::new();
    for param in value.split(',') {
        let (name, value) = param
            .split_once('=')
            .ok_or_else(|| format!("invalid parameter '{}'", param))?;
        let name = name.trim().to_ascii_lowercase();
        if !seen.insert(name.clone()) {
            return Err(format!("repeated parameter '{}'", name));
        }
        params.push((name, value.trim().to_string()));
    }
    Ok(params)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("{} is invalid value for {}", value, name)),
    }
}

fn parse_cache_line(line: &str) -> Result<CacheConfig, String> {
    let values = columns(line)?;
    let cache_id = parse_id(values[0], "cache id")?;
    let cache_mode = values[2].parse().map_err(|e: crate::CasError| e.to_string())?;
    let mut cache = CacheConfig::new(cache_id, values[1], cache_mode);

    if let Some(extra) = values.get(3) {
        for (name, value) in parse_params(extra)? {
            let invalid = |e: crate::CasError| e.to_string();
            match name.as_str() {
                "ioclass_file" => cache.ioclass_file = Some(PathBuf::from(value)),
                "cleaning_policy" => cache.cleaning_policy = value.parse().map_err(invalid)?,
                "promotion_policy" => cache.promotion_policy = value.parse().map_err(invalid)?,
                "cache_line_size" => cache.line_size = value.parse().map_err(invalid)?,
                "lazy_startup" => cache.lazy_startup = parse_bool(&name, &value)?,
                _ => return Err(format!("{} is invalid parameter name", name)),
            }
        }
    }

    Ok(cache)
}

fn parse_core_line(line: &str) -> Result<CoreConfig, String> {
    let values = columns(line)?;
    let cache_id = parse_id(values[0], "cache id")?;
    let core_id = parse_id(values[1], "core id")?;
    let mut core = CoreConfig::new(cache_id, core_id, values[2]);

    if let Some(extra) = values.get(3) {
        for (name, value) in parse_params(extra)? {
            match name.as_str() {
                "lazy_startup" => core.lazy_startup = parse_bool(&name, &value)?,
                _ => return Err(format!("{} is invalid parameter name", name)),
            }
        }
    }

    Ok(core)
}

fn cache_params(cache: &CacheConfig) -> Vec<String> {
    let mut params = Vec::new();
    if let Some(file) = &cache.ioclass_file {
        params.push(format!("ioclass_file={}", file.display()));
    }
    if cache.cleaning_policy != CleaningPolicy::default() {
        params.push(format!("cleaning_policy={}", cache.cleaning_policy));
    }
    if cache.promotion_policy != PromotionPolicy::default() {
        params.push(format!("promotion_policy={}", cache.promotion_policy));
    }
    if cache.line_size != LineSize::default() {
        params.push(format!("cache_line_size={}", cache.line_size));
    }
    if cache.lazy_startup {
        params.push("lazy_startup=true".to_string());
    }
    params
}

pub(super) fn render_registry(registry: &Registry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}{}", VERSION_PREFIX, registry.version_tag);
    let _ = writeln!(out, "{}", FORMAT_HEADER);

    let _ = writeln!(out, "{}", SECTION_CACHES);
    let _ = writeln!(out, "## Cache ID\tCache device\tCache mode\tExtra fields (optional)");
    for cache in registry.caches.values() {
        let _ = write!(
            out,
            "{}\t{}\t{}",
            cache.cache_id,
            cache.device.display(),
            cache.cache_mode.as_str().to_ascii_uppercase()
        );
        let params = cache_params(cache);
        if !params.is_empty() {
            let _ = write!(out, "\t{}", params.join(","));
        }
        out.push('\n');
    }

    out.push('\n');
    let _ = writeln!(out, "{}", SECTION_CORES);
    let _ = writeln!(out, "## Cache ID\tCore ID\tCore device");
    for core in &registry.cores {
        let _ = write!(
            out,
            "{}\t{}\t{}",
            core.cache_id,
            core.core_id,
            core.device.display()
        );
        if core.lazy_startup {
            out.push_str("\tlazy_startup=true");
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheMode;

    const SAMPLE: &str = "\
version=19.3.0
# This config was automatically generated
[caches]
## Cache ID	Cache device	Cache mode	Extra fields (optional)
1	/dev/nvme0n1	WB	cleaning_policy=acp,cache_line_size=8
2	/dev/nvme1n1	wt	ioclass_file=/etc/opencas/ansible/db.csv,promotion_policy=nhit,lazy_startup=true

[cores]
## Cache ID	Core ID	Core device
1	1	/dev/sda
1	2	/dev/sdb   # trailing comment
2	1	/dev/sdc	lazy_startup=true
";

    #[test]
    fn test_parse_sample() {
        let r = parse_registry(SAMPLE).unwrap();
        assert_eq!(r.version_tag, "19.3.0");
        assert_eq!(r.caches.len(), 2);
        assert_eq!(r.cores.len(), 3);

        let c1 = r.cache(1).unwrap();
        assert_eq!(c1.cache_mode, CacheMode::Wb);
        assert_eq!(c1.cleaning_policy, CleaningPolicy::Acp);
        assert_eq!(c1.line_size, LineSize::K8);

        let c2 = r.cache(2).unwrap();
        assert_eq!(c2.promotion_policy, PromotionPolicy::Nhit);
        assert!(c2.lazy_startup);
        assert_eq!(
            c2.ioclass_file.as_deref(),
            Some(std::path::Path::new("/etc/opencas/ansible/db.csv"))
        );

        assert_eq!(r.cores[1].device, PathBuf::from("/dev/sdb"));
        assert!(r.cores[2].lazy_startup);
    }

    #[test]
    fn test_render_then_parse_is_lossless() {
        let r = parse_registry(SAMPLE).unwrap();
        let text = r.to_text();
        let again = parse_registry(&text).unwrap();
        assert_eq!(r, again);
        assert_eq!(text, again.to_text());
    }

    #[test]
    fn test_render_omits_defaults() {
        let mut r = Registry::new("V1");
        r.insert_cache(CacheConfig::new(1, "/dev/nvme0n1", CacheMode::Wb));
        let text = r.to_text();
        assert!(text.starts_with("version=V1\n"));
        assert!(text.contains("1\t/dev/nvme0n1\tWB\n"));
    }

    #[test]
    fn test_missing_version_tag() {
        let err = parse_registry("[caches]\n1 /dev/nvme0n1 wt\n").unwrap_err();
        assert!(err.contains("version tag"));
        assert!(parse_registry("version=\n").is_err());
    }

    #[test]
    fn test_column_counts() {
        let err = parse_registry("version=1\n[caches]\n1 /dev/nvme0n1\n").unwrap_err();
        assert!(err.contains("too few columns"));
        let err = parse_registry("version=1\n[cores]\n1 1 /dev/sda x=1 y\n").unwrap_err();
        assert!(err.contains("too many columns"));
    }

    #[test]
    fn test_bad_parameters() {
        let err =
            parse_registry("version=1\n[caches]\n1 /dev/nvme0n1 wt target_fs=ext4\n").unwrap_err();
        assert!(err.contains("invalid parameter name"));
        let err = parse_registry(
            "version=1\n[caches]\n1 /dev/nvme0n1 wt cleaning_policy=acp,cleaning_policy=nop\n",
        )
        .unwrap_err();
        assert!(err.contains("repeated"));
        let err =
            parse_registry("version=1\n[caches]\n1 /dev/nvme0n1 wt cache_line_size=5\n").unwrap_err();
        assert!(err.contains("line size"));
    }

    #[test]
    fn test_duplicate_entries() {
        let err = parse_registry("version=1\n[caches]\n1 /dev/a wt\n1 /dev/b wt\n").unwrap_err();
        assert!(err.contains("more than once"));
        let err = parse_registry("version=1\n[cores]\n1 1 /dev/a\n1 1 /dev/a\n").unwrap_err();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn test_empty_sections() {
        let r = parse_registry("version=20.12\n[caches]\n[cores]\n").unwrap();
        assert!(r.is_empty());
    }
}
