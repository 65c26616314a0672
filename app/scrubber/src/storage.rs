use indexmap::IndexMap;

use crate::config::AppConfig;
use crate::config::Profile;
use crate::record::FileRecord;
use crate::record::Koaid;
use crate::record::Level;

/// Derives long term storage locations from a koaid and per instrument disk numbers.
/// Pure path arithmetic, nothing here touches the filesystem.
pub struct StorageLayout<'a> {
    prefixes: &'a IndexMap<String, String>,
    storage_disk: &'a IndexMap<String, String>,
    koa_disk: &'a IndexMap<String, String>,
    storage_root: &'a str,
    koa_root: &'a str,
}

impl<'a> StorageLayout<'a> {
    pub fn new(config: &'a AppConfig, profile: &'a Profile) -> Self {
        StorageLayout {
            prefixes: &config.instruments.prefixes,
            storage_disk: &config.instruments.storage_disk,
            koa_disk: &config.instruments.koa_disk,
            storage_root: &profile.storage_root,
            koa_root: &config.instruments.koa_root,
        }
    }

    pub fn destination_for(&self, record: &FileRecord, level: Level) -> Option<String> {
        let koaid = record.koaid()?;
        match level {
            Level::Stage => self.stage_destination(koaid, record.ofname()?),
            Level::Lev0 | Level::Lev1 | Level::Lev2 => self.processed_destination(koaid, level),
        }
    }

    /// `{storage_root}{store_num}/{inst}/stage/{inst}/{utdate}/{source_subdir}`
    pub fn stage_destination(&self, koaid: &str, ofname: &str) -> Option<String> {
        let (inst, koaid) = self.instrument(koaid)?;
        let store_num = self.storage_disk.get(inst)?;
        let (source_dir, filename) = ofname.rsplit_once('/')?;
        if !filename.contains("fits") {
            return None;
        }
        let source_subdir = source_dir.trim_start_matches('/');
        let storage_root = self.storage_root;
        let utdate = koaid.utdate;
        Some(format!(
            "{storage_root}{store_num}/{inst}/stage/{inst}/{utdate}/{source_subdir}"
        ))
    }

    /// `{storage_root}{store_num}/{inst}/{koa_root}{koa_num}/{utdate}/lev{level}/`
    pub fn processed_destination(&self, koaid: &str, level: Level) -> Option<String> {
        let (inst, koaid) = self.instrument(koaid)?;
        let store_num = self.storage_disk.get(inst)?;
        let koa_num = self.koa_disk.get(inst)?;
        let storage_root = self.storage_root;
        let koa_root = self.koa_root;
        let utdate = koaid.utdate;
        let lev = level.dir_name();
        Some(format!(
            "{storage_root}{store_num}/{inst}/{koa_root}{koa_num}/{utdate}/{lev}/"
        ))
    }

    pub fn instrument<'k>(&self, koaid: &'k str) -> Option<(&'a str, Koaid<'k>)> {
        let koaid = Koaid::parse(koaid)?;
        let prefixes: &'a IndexMap<String, String> = self.prefixes;
        let inst = prefixes.get(koaid.prefix)?;
        Some((inst.as_str(), koaid))
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::json;

    use super::StorageLayout;
    use crate::record::FileRecord;
    use crate::record::Level;

    struct Tables {
        prefixes: IndexMap<String, String>,
        storage_disk: IndexMap<String, String>,
        koa_disk: IndexMap<String, String>,
    }

    fn tables() -> Tables {
        Tables {
            prefixes: IndexMap::from([("KB".to_owned(), "KCWI".to_owned())]),
            storage_disk: IndexMap::from([("KCWI".to_owned(), "04".to_owned())]),
            koa_disk: IndexMap::from([("KCWI".to_owned(), "39".to_owned())]),
        }
    }

    fn layout(tables: &Tables) -> StorageLayout<'_> {
        StorageLayout {
            prefixes: &tables.prefixes,
            storage_disk: &tables.storage_disk,
            koa_disk: &tables.koa_disk,
            storage_root: "/koastorage",
            koa_root: "koadata",
        }
    }

    #[test]
    fn processed_destination() {
        let tables = tables();
        let layout = layout(&tables);
        assert_eq!(
            layout.processed_destination("KB.20210116.57436.94", Level::Lev0).as_deref(),
            Some("/koastorage04/KCWI/koadata39/20210116/lev0/")
        );
        assert_eq!(
            layout.processed_destination("KB.20210116.57436.94", Level::Lev2).as_deref(),
            Some("/koastorage04/KCWI/koadata39/20210116/lev2/")
        );
    }

    #[test]
    fn destination_is_idempotent() {
        let tables = tables();
        let layout = layout(&tables);
        let first = layout.processed_destination("KB.20210116.57436.94", Level::Lev1);
        let second = layout.processed_destination("KB.20210116.57436.94", Level::Lev1);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_koaid() {
        let tables = tables();
        let layout = layout(&tables);
        assert_eq!(layout.processed_destination("KB.20210116.57436", Level::Lev0), None);
        assert_eq!(layout.processed_destination("KB.20210116.57436.94.1", Level::Lev0), None);
        assert_eq!(layout.processed_destination("XX.20210116.57436.94", Level::Lev0), None);
    }

    #[test]
    fn stage_destination() {
        let tables = tables();
        let layout = layout(&tables);
        assert_eq!(
            layout
                .stage_destination("KB.20210116.57436.94", "/s/sdata1400/kcwi1/2021jan16/kb210116_00094.fits")
                .as_deref(),
            Some("/koastorage04/KCWI/stage/KCWI/20210116/s/sdata1400/kcwi1/2021jan16")
        );
        assert_eq!(
            layout.stage_destination("KB.20210116.57436.94", "/s/sdata1400/kcwi1/2021jan16/kb210116.log"),
            None
        );
    }

    #[test]
    fn destination_for_record() {
        let tables = tables();
        let layout = layout(&tables);
        let record: FileRecord = serde_json::from_value(json!({
            "koaid": "KB.20210116.57436.94",
            "ofname": "/s/sdata1400/kcwi1/2021jan16/kb210116_00094.fits"
        }))
        .unwrap();
        assert_eq!(
            layout.destination_for(&record, Level::Stage).as_deref(),
            Some("/koastorage04/KCWI/stage/KCWI/20210116/s/sdata1400/kcwi1/2021jan16")
        );
        assert_eq!(
            layout.destination_for(&record, Level::Lev0).as_deref(),
            Some("/koastorage04/KCWI/koadata39/20210116/lev0/")
        );
    }
}
