//! The NVT cache reader.
//!
//! The import pipeline stores, in the record namespace:
//! - `nvt:<oid>`: the record, a list laid out as [`NVT_FIELDS`]
//! - `oid:<oid>:prefs`: the preferences, see [`preferences`]
//! - `nvticache`: the feed version the cache was loaded from
//!
//! Nothing is kept between calls, every read goes to the store.

pub mod preferences;
pub mod tags;

use log::{debug, trace, warn};

use crate::errors::CacheError;
use crate::kb::BoundConnection;
use crate::models::{NvtField, NvtMetadata, NvtParam, NvtParams, NvtRefs, NVT_FIELDS};
use crate::readers::KbStore;

/// The prefix of the record keys.
pub const NVT_KEY_PREFIX: &str = "nvt:";

/// The key holding the feed version.
pub const CACHE_VERSION_KEY: &str = "nvticache";

/// The key of the record of an NVT.
pub fn nvt_key(oid: &str) -> String {
    format!("{}{}", NVT_KEY_PREFIX, oid)
}

/// The key of the preferences of an NVT.
pub fn prefs_key(oid: &str) -> String {
    format!("oid:{}:prefs", oid)
}

/// Reads the raw preferences of an NVT.
/// `ctx` must be switched to the record namespace.
pub fn fetch_preferences<S: KbStore>(ctx: &mut S, oid: &str) -> Result<Vec<String>, CacheError> {
    trace!("Running fetch_preferences() for {}", oid);
    ctx.lrange(&prefs_key(oid), 0, -1)
}

/// Reads the script timeout of an NVT, empty when not set.
/// `ctx` must be switched to the record namespace.
pub fn fetch_timeout<S: KbStore>(ctx: &mut S, oid: &str) -> Result<String, CacheError> {
    trace!("Running fetch_timeout() for {}", oid);
    let timeout = ctx.lindex(&nvt_key(oid), NvtField::Timeout.index() as i64)?;
    Ok(timeout.unwrap_or_default())
}

/// Reads the raw tag blob of an NVT, empty when not set.
/// `ctx` must be switched to the record namespace.
pub fn fetch_tag<S: KbStore>(ctx: &mut S, oid: &str) -> Result<String, CacheError> {
    trace!("Running fetch_tag() for {}", oid);
    let tag = ctx.lindex(&nvt_key(oid), NvtField::Tag.index() as i64)?;
    Ok(tag.unwrap_or_default())
}

/// Splits a reference field. An empty field gives `[""]`.
fn split_references(raw: &str) -> Vec<String> {
    raw.split(',').map(|r| r.trim().to_string()).collect()
}

/// Reads NVT records through a bound connection.
pub struct NvtCache<'a, S: KbStore> {
    kb: &'a mut BoundConnection<S>,
}

impl<'a, S: KbStore> NvtCache<'a, S> {
    /// Creates a new NvtCache
    pub fn new(kb: &'a mut BoundConnection<S>) -> Self {
        NvtCache { kb }
    }

    /// Returns the metadata of an NVT: the positional fields merged with
    /// its tags. A tag named like a positional field replaces it.
    pub fn fetch_metadata(&mut self, oid: &str) -> Result<NvtMetadata, CacheError> {
        trace!("Running NvtCache::fetch_metadata() for {}", oid);
        let last = NVT_FIELDS.len() as i64 - 1;
        let values = self.kb.records()?.lrange(&nvt_key(oid), 0, last)?;
        if values.is_empty() {
            debug!("No record for {}", oid);
            return Err(CacheError::RecordNotFound(oid.to_string()));
        }
        if values.len() < NVT_FIELDS.len() {
            warn!(
                "The record of {} has {} fields instead of {}",
                oid,
                values.len(),
                NVT_FIELDS.len()
            );
        }

        let mut metadata = NvtMetadata::new();
        let mut blob = String::new();
        for field in NVT_FIELDS.iter() {
            let value = values.get(field.index()).cloned().unwrap_or_default();
            if *field == NvtField::Tag {
                blob = value;
            } else if field.is_metadata() {
                metadata.insert(field.name().to_string(), value);
            }
        }
        metadata.extend(tags::parse_tags(oid, &blob));
        Ok(metadata)
    }

    /// Returns the raw preferences of an NVT.
    pub fn fetch_preferences(&mut self, oid: &str) -> Result<Vec<String>, CacheError> {
        fetch_preferences(self.kb.records()?, oid)
    }

    /// Returns the script timeout of an NVT, empty when not set.
    pub fn fetch_timeout(&mut self, oid: &str) -> Result<String, CacheError> {
        fetch_timeout(self.kb.records()?, oid)
    }

    /// Returns the raw tag blob of an NVT, empty when not set.
    pub fn fetch_tag(&mut self, oid: &str) -> Result<String, CacheError> {
        fetch_tag(self.kb.records()?, oid)
    }

    /// Returns the options of an NVT by name, with the script timeout
    /// added as the "timeout" option.
    pub fn fetch_params(&mut self, oid: &str) -> Result<NvtParams, CacheError> {
        trace!("Running NvtCache::fetch_params() for {}", oid);
        let ctx = self.kb.records()?;
        let raw = fetch_preferences(ctx, oid)?;
        let mut params = preferences::parse_preferences(oid, &raw);

        let timeout = fetch_timeout(ctx, oid)?;
        params.insert(
            "timeout".to_string(),
            NvtParam::new("entry", &timeout, "timeout", "Script Timeout"),
        );
        Ok(params)
    }

    /// Returns the CVE, BID and other references of an NVT.
    pub fn fetch_references(&mut self, oid: &str) -> Result<NvtRefs, CacheError> {
        trace!("Running NvtCache::fetch_references() for {}", oid);
        let values = self.kb.records()?.lrange(
            &nvt_key(oid),
            NvtField::Cve.index() as i64,
            NvtField::Xref.index() as i64,
        )?;
        match values.as_slice() {
            [cve, bid, xref] => Ok(NvtRefs {
                cve: split_references(cve),
                bid: split_references(bid),
                xref: split_references(xref),
            }),
            _ => {
                debug!("No references for {}, got {} fields", oid, values.len());
                Err(CacheError::RecordNotFound(oid.to_string()))
            }
        }
    }

    /// Returns the feed version the cache was loaded from, None when the
    /// cache is not loaded.
    pub fn fetch_feed_version(&mut self) -> Result<Option<String>, CacheError> {
        trace!("Running NvtCache::fetch_feed_version()");
        self.kb.records()?.get(CACHE_VERSION_KEY)
    }

    /// Returns the OIDs of every cached NVT, sorted.
    pub fn list_oids(&mut self) -> Result<Vec<String>, CacheError> {
        trace!("Running NvtCache::list_oids()");
        let pattern = format!("{}*", NVT_KEY_PREFIX);
        let mut oids: Vec<String> = self
            .kb
            .records()?
            .keys(&pattern)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(NVT_KEY_PREFIX).map(|o| o.to_string()))
            .collect();
        oids.sort();
        Ok(oids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::{NamespaceAllocator, RECORD_NAMESPACE};
    use crate::readers::memory::MemoryKb;

    const OID: &str = "1.3.6.1.4.1.25623.1.0.100126";

    const MANTIS: [&str; 15] = [
        "mantis_detect.nasl",
        "",
        "",
        "Settings/disable_cgi_scanning",
        "",
        "Services/www, 80",
        "find_service.nasl, http_version.nasl",
        "cvss_base=0.0|cvss_base_vector=AV:N/AC:L/Au:N/C:N/I:N/A:N|last_modification=$Date: 2018-08-10 15:09:25 +0200 (Fri, 10 Aug 2018) $|creation_date=2009-03-19 11:22:36 +0100 (Thu, 19 Mar 2009)|summary=Detects the installed version of\n  Mantis a free popular web-based bugtracking system.|qod_type=remote_banner",
        "",
        "",
        "URL:http://www.mantisbt.org/",
        "3",
        "0",
        "Product detection",
        "Mantis Detection",
    ];

    fn bound(kb: MemoryKb) -> BoundConnection<MemoryKb> {
        NamespaceAllocator::new(kb).claim().unwrap()
    }

    fn mantis_kb() -> MemoryKb {
        let mut kb = MemoryKb::new(8);
        kb.set_string(RECORD_NAMESPACE, CACHE_VERSION_KEY, "201808101509");
        kb.push_list(RECORD_NAMESPACE, &nvt_key(OID), &MANTIS);
        kb.push_list(
            RECORD_NAMESPACE,
            &prefs_key(OID),
            &["dns-fuzz.timelimit|||entry|||"],
        );
        kb
    }

    #[test]
    fn metadata_merges_fields_and_tags() {
        let mut kb = bound(mantis_kb());
        let metadata = NvtCache::new(&mut kb).fetch_metadata(OID).unwrap();

        assert_eq!(metadata.len(), 14);
        assert_eq!(metadata["filename"], "mantis_detect.nasl");
        assert_eq!(metadata["excluded_keys"], "Settings/disable_cgi_scanning");
        assert_eq!(metadata["required_ports"], "Services/www, 80");
        assert_eq!(metadata["dependencies"], "find_service.nasl, http_version.nasl");
        assert_eq!(metadata["category"], "3");
        assert_eq!(metadata["timeout"], "0");
        assert_eq!(metadata["family"], "Product detection");
        assert_eq!(metadata["name"], "Mantis Detection");
        assert_eq!(metadata["cvss_base_vector"], "AV:N/AC:L/Au:N/C:N/I:N/A:N");
        assert_eq!(
            metadata["summary"],
            "Detects the installed version of\n  Mantis a free popular web-based bugtracking system."
        );
        assert_eq!(metadata["qod_type"], "remote_banner");
        assert!(!metadata.contains_key("required_keys"));
        assert!(!metadata.contains_key("xref"));
    }

    #[test]
    fn empty_positional_fields_are_present() {
        let mut kb = mantis_kb();
        let mut record = MANTIS;
        record[3] = "";
        record[7] = "";
        kb.push_list(RECORD_NAMESPACE, &nvt_key("1.2.3"), &record);
        let mut kb = bound(kb);
        let metadata = NvtCache::new(&mut kb).fetch_metadata("1.2.3").unwrap();
        assert_eq!(metadata.len(), 8);
        assert_eq!(metadata["excluded_keys"], "");
    }

    #[test]
    fn tags_override_positional_fields() {
        let mut kb = mantis_kb();
        let mut record = MANTIS;
        record[7] = "family=Overridden|broken";
        kb.push_list(RECORD_NAMESPACE, &nvt_key("1.2.3"), &record);
        let mut kb = bound(kb);
        let metadata = NvtCache::new(&mut kb).fetch_metadata("1.2.3").unwrap();
        assert_eq!(metadata["family"], "Overridden");
        assert_eq!(metadata.len(), 8);
    }

    #[test]
    fn missing_record_is_not_found() {
        let mut kb = bound(mantis_kb());
        let mut cache = NvtCache::new(&mut kb);
        assert_eq!(
            cache.fetch_metadata("1.2.3"),
            Err(CacheError::RecordNotFound("1.2.3".to_string()))
        );
        assert_eq!(
            cache.fetch_references("1.2.3"),
            Err(CacheError::RecordNotFound("1.2.3".to_string()))
        );
    }

    #[test]
    fn params_include_the_timeout() {
        let mut kb = mantis_kb();
        kb.push_list(RECORD_NAMESPACE, &nvt_key(OID), &{
            let mut record = MANTIS;
            record[12] = "300";
            record
        });
        let mut kb = bound(kb);
        let params = NvtCache::new(&mut kb).fetch_params(OID).unwrap();

        assert_eq!(params.len(), 2);
        assert_eq!(
            params["dns-fuzz.timelimit"],
            NvtParam::new("entry", "", "dns-fuzz.timelimit", "Description")
        );
        assert_eq!(
            params["timeout"],
            NvtParam::new("entry", "300", "timeout", "Script Timeout")
        );
    }

    #[test]
    fn timeout_param_is_present_without_a_record() {
        let mut kb = bound(MemoryKb::new(4));
        let params = NvtCache::new(&mut kb).fetch_params("1.2.3").unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params["timeout"].default, "");
        assert_eq!(params["timeout"].description, "Script Timeout");
    }

    #[test]
    fn references_are_split() {
        let mut kb = mantis_kb();
        let mut record = MANTIS;
        record[8] = "CVE-2018-1000088, CVE-2018-1000089";
        kb.push_list(RECORD_NAMESPACE, &nvt_key("1.2.3"), &record);
        let mut kb = bound(kb);
        let mut cache = NvtCache::new(&mut kb);

        let refs = cache.fetch_references(OID).unwrap();
        assert_eq!(refs.cve, vec![""]);
        assert_eq!(refs.bid, vec![""]);
        assert_eq!(refs.xref, vec!["URL:http://www.mantisbt.org/"]);

        let refs = cache.fetch_references("1.2.3").unwrap();
        assert_eq!(refs.cve, vec!["CVE-2018-1000088", "CVE-2018-1000089"]);
    }

    #[test]
    fn scalar_fetchers_read_the_record_namespace() {
        let mut kb = bound(mantis_kb());
        let mut cache = NvtCache::new(&mut kb);
        assert_eq!(cache.fetch_timeout(OID).unwrap(), "0");
        assert!(cache.fetch_tag(OID).unwrap().starts_with("cvss_base=0.0|"));
        assert_eq!(
            cache.fetch_preferences(OID).unwrap(),
            vec!["dns-fuzz.timelimit|||entry|||"]
        );
        assert_eq!(cache.fetch_timeout("1.2.3").unwrap(), "");
        assert_eq!(cache.fetch_tag("1.2.3").unwrap(), "");
        assert!(cache.fetch_preferences("1.2.3").unwrap().is_empty());
    }

    #[test]
    fn low_level_fetchers_use_the_given_context() {
        let mut kb = mantis_kb();
        kb.select(RECORD_NAMESPACE).unwrap();
        assert_eq!(fetch_timeout(&mut kb, OID).unwrap(), "0");
        kb.select(1).unwrap();
        assert_eq!(fetch_timeout(&mut kb, OID).unwrap(), "");
    }

    #[test]
    fn version_and_oids_are_listed() {
        let mut kb = mantis_kb();
        kb.push_list(RECORD_NAMESPACE, &nvt_key("1.2.3"), &MANTIS);
        let mut kb = bound(kb);
        let mut cache = NvtCache::new(&mut kb);
        assert_eq!(
            cache.fetch_feed_version().unwrap(),
            Some("201808101509".to_string())
        );
        assert_eq!(cache.list_oids().unwrap(), vec!["1.2.3", OID]);
    }

    #[test]
    fn reads_do_not_touch_the_claimed_namespace() {
        let mut kb = bound(mantis_kb());
        let index = kb.index();
        NvtCache::new(&mut kb).fetch_metadata(OID).unwrap();
        assert_eq!(kb.scratch().unwrap().dbsize().unwrap(), 0);
        let kb = kb.into_inner().unwrap();
        assert_eq!(kb.len_of(index), 0);
    }
}
