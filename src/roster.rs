use std::collections::BTreeSet;

use tracing::debug;
use uuid::Uuid;

use crate::models::{Manager, Sector};

/// Manager row as stored, with the three overlapping sector fields.
#[derive(Debug, Clone, Default)]
pub struct RawManager {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    /// Legacy single-sector column.
    pub sector: Option<String>,
    pub sectors: Vec<String>,
    /// Legacy flag marking managers who also take calls.
    pub handles_calls: bool,
}

/// Merges the legacy sector column, the sector array and the calls flag into
/// one set. Unrecognized values are skipped.
pub fn derive_sectors(raw: &RawManager) -> BTreeSet<Sector> {
    let mut sectors = BTreeSet::new();

    for value in raw.sector.iter().chain(raw.sectors.iter()) {
        if value.trim().is_empty() {
            continue;
        }
        match value.parse::<Sector>() {
            Ok(sector) => {
                sectors.insert(sector);
            }
            Err(err) => debug!(manager = %raw.id, %err, "ignoring sector value"),
        }
    }

    if raw.handles_calls {
        sectors.insert(Sector::Calls);
    }

    sectors
}

pub fn normalize(raw: RawManager) -> Manager {
    let sectors = derive_sectors(&raw);
    Manager {
        id: raw.id,
        name: raw.name,
        active: raw.active,
        sectors,
    }
}

pub fn in_sector(managers: &[Manager], sector: Sector) -> Vec<&Manager> {
    managers
        .iter()
        .filter(|manager| manager.sectors.contains(&sector))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(sector: Option<&str>, sectors: &[&str], handles_calls: bool) -> RawManager {
        RawManager {
            id: Uuid::new_v4(),
            name: "Marina Souza".to_string(),
            active: true,
            sector: sector.map(str::to_string),
            sectors: sectors.iter().map(|s| s.to_string()).collect(),
            handles_calls,
        }
    }

    #[test]
    fn merges_all_three_sources() {
        let sectors = derive_sectors(&raw(Some("telegram"), &[], true));
        assert_eq!(sectors, BTreeSet::from([Sector::Calls, Sector::Telegram]));
    }

    #[test]
    fn array_and_legacy_field_deduplicate() {
        let sectors = derive_sectors(&raw(Some("calls"), &["calls", "Telegram"], false));
        assert_eq!(sectors, BTreeSet::from([Sector::Calls, Sector::Telegram]));
    }

    #[test]
    fn blank_and_unknown_values_are_skipped() {
        let sectors = derive_sectors(&raw(Some(" "), &["finance"], false));
        assert!(sectors.is_empty());
    }

    #[test]
    fn sector_filter_uses_normalized_set() {
        let managers = vec![
            normalize(raw(None, &["telegram"], false)),
            normalize(raw(None, &[], true)),
        ];
        assert_eq!(in_sector(&managers, Sector::Calls).len(), 1);
        assert_eq!(in_sector(&managers, Sector::Telegram).len(), 1);
    }
}
