//! Target-set filtering by instance placement predicate (§4.3).

use crate::config::target::Target;
use crate::context::InstanceLocation;

/// Filter `targets` to the ones whose predicate matches this instance's
/// location. Falls back to the unfiltered list if the filter would empty
/// it out, so a misconfigured predicate never breaks traffic entirely.
pub fn filter_by_location<'a>(targets: &'a [Target], location: &InstanceLocation) -> Vec<&'a Target> {
    let filtered: Vec<&Target> = targets
        .iter()
        .filter(|t| t.predicate.matches(location.region.as_deref(), location.zone.as_deref()))
        .collect();

    if filtered.is_empty() {
        targets.iter().collect()
    } else {
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::target::{Predicate, Scheme};

    fn target(id: &str, predicate: Predicate) -> Target {
        Target { id: id.into(), host: "h".into(), port: 80, scheme: Scheme::Http, weight: 1, ip_address: None, predicate }
    }

    #[test]
    fn falls_back_to_unfiltered_when_nothing_matches() {
        let targets = vec![target("a", Predicate::RegionMatch { region: "eu".into() })];
        let location = InstanceLocation { region: Some("us".into()), zone: None };
        let result = filter_by_location(&targets, &location);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn filters_to_matching_region() {
        let targets = vec![
            target("a", Predicate::RegionMatch { region: "eu".into() }),
            target("b", Predicate::RegionMatch { region: "us".into() }),
        ];
        let location = InstanceLocation { region: Some("us".into()), zone: None };
        let result = filter_by_location(&targets, &location);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "b");
    }
}
