use std::collections::HashSet;

use crate::docker::ContainerRecord;
use crate::error::{FleetError, Result};

/// Host-port scan range start (inclusive). Kept well above the ports the
/// fleet images themselves listen on.
pub const PORT_RANGE_START: u16 = 5000;
/// Host-port scan range end (exclusive).
pub const PORT_RANGE_END: u16 = 10000;

/// Collect every host port published by the given container snapshot.
pub fn published_ports(containers: &[ContainerRecord]) -> HashSet<u16> {
    containers
        .iter()
        .flat_map(|container| container.ports.iter().map(|port| port.host))
        .collect()
}

/// Pick `count` free host ports, lowest first.
///
/// Pure over the snapshot: the fleet can allocate ports concurrently with
/// us, so the result is only as fresh as `used`. The descriptor is applied
/// moments after allocation, which is the window this design accepts.
pub fn allocate(used: &HashSet<u16>, count: usize) -> Result<Vec<u16>> {
    let mut free = Vec::with_capacity(count);
    for port in PORT_RANGE_START..PORT_RANGE_END {
        if free.len() == count {
            break;
        }
        if !used.contains(&port) {
            free.push(port);
        }
    }

    if free.len() < count {
        return Err(FleetError::InsufficientPorts {
            requested: count,
            found: free.len(),
        });
    }
    Ok(free)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::PublishedPort;

    fn record(ports: &[(u16, u16)]) -> ContainerRecord {
        ContainerRecord {
            service_name: "svc".to_string(),
            labels: Default::default(),
            ports: ports
                .iter()
                .map(|&(container, host)| PublishedPort { container, host })
                .collect(),
            origin_host: None,
        }
    }

    #[test]
    fn allocates_from_range_start_when_nothing_is_used() {
        let ports = allocate(&HashSet::new(), 8).unwrap();
        assert_eq!(ports, vec![5000, 5001, 5002, 5003, 5004, 5005, 5006, 5007]);
    }

    #[test]
    fn skips_ports_already_published_on_the_fleet() {
        let used = published_ports(&[record(&[(5900, 5000)]), record(&[(5900, 5002), (15900, 5003)])]);
        assert_eq!(allocate(&used, 3).unwrap(), vec![5001, 5004, 5005]);
    }

    #[test]
    fn returns_exactly_count_ascending_unused_ports() {
        let used: HashSet<u16> = (5000..5100).filter(|p| p % 3 == 0).collect();
        let ports = allocate(&used, 40).unwrap();
        assert_eq!(ports.len(), 40);
        assert!(ports.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(ports.iter().all(|p| !used.contains(p)));
        assert!(ports.iter().all(|p| (PORT_RANGE_START..PORT_RANGE_END).contains(p)));
    }

    #[test]
    fn zero_ports_is_an_empty_allocation() {
        assert_eq!(allocate(&HashSet::new(), 0).unwrap(), Vec::<u16>::new());
    }

    #[test]
    fn exhausted_range_is_an_explicit_error() {
        let used: HashSet<u16> = (PORT_RANGE_START..PORT_RANGE_END).collect();
        match allocate(&used, 4) {
            Err(FleetError::InsufficientPorts { requested, found }) => {
                assert_eq!(requested, 4);
                assert_eq!(found, 0);
            }
            other => panic!("expected InsufficientPorts, got {other:?}"),
        }
    }

    #[test]
    fn short_scan_reports_how_many_it_found() {
        // Leave only two ports free across the whole range.
        let used: HashSet<u16> = (PORT_RANGE_START..PORT_RANGE_END)
            .filter(|p| *p != 6000 && *p != 7000)
            .collect();
        match allocate(&used, 3) {
            Err(FleetError::InsufficientPorts { requested, found }) => {
                assert_eq!(requested, 3);
                assert_eq!(found, 2);
            }
            other => panic!("expected InsufficientPorts, got {other:?}"),
        }
    }
}
