use crate::error::SettingsError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
}

impl Waypoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Market Street, San Francisco, from the Ferry Building to Van Ness Ave.
pub const MARKET_STREET: [Waypoint; 10] = [
    Waypoint::new(37.7950, -122.3940),
    Waypoint::new(37.7935, -122.3965),
    Waypoint::new(37.7920, -122.3990),
    Waypoint::new(37.7905, -122.4015),
    Waypoint::new(37.7885, -122.4045),
    Waypoint::new(37.7865, -122.4075),
    Waypoint::new(37.7845, -122.4105),
    Waypoint::new(37.7825, -122.4135),
    Waypoint::new(37.7805, -122.4165),
    Waypoint::new(37.7780, -122.4195),
];

/// One visited waypoint together with its 1-based position on the path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub waypoint: Waypoint,
    pub position: usize,
    pub length: usize,
}

/// Endless walk over a fixed list of waypoints, wrapping back to the first
/// after the last. Restart by building a new one.
#[derive(Debug, Clone)]
pub struct PathModel {
    waypoints: Vec<Waypoint>,
    cursor: usize,
}

impl PathModel {
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, SettingsError> {
        if waypoints.is_empty() {
            return Err(SettingsError::Invalid(String::from(
                "path must contain at least one waypoint",
            )));
        }

        Ok(Self { waypoints, cursor: 0 })
    }

    pub fn next_step(&mut self) -> Step {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.waypoints.len();

        Step {
            waypoint: self.waypoints[index],
            position: index + 1,
            length: self.waypoints.len(),
        }
    }
}

impl Iterator for PathModel {
    type Item = Step;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_step())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path_rejected() {
        assert!(PathModel::new(Vec::new()).is_err());
    }

    #[test]
    fn test_positions_are_one_based() {
        let mut path = PathModel::new(MARKET_STREET.to_vec()).unwrap();

        let first = path.next_step();
        assert_eq!(first.position, 1);
        assert_eq!(first.length, 10);
        assert_eq!(first.waypoint, MARKET_STREET[0]);

        let last = path.nth(8).unwrap();
        assert_eq!(last.position, 10);
        assert_eq!(last.waypoint, MARKET_STREET[9]);
    }

    #[test]
    fn test_traversal_wraps_around() {
        for length in 1..=4 {
            let waypoints: Vec<Waypoint> = (0..length)
                .map(|i| Waypoint::new(i as f64, -(i as f64)))
                .collect();

            let visited: Vec<Waypoint> = PathModel::new(waypoints)
                .unwrap()
                .take(length * 3 + 2)
                .map(|step| step.waypoint)
                .collect();

            for k in 0..visited.len() - length {
                assert_eq!(visited[k], visited[k + length], "length {length}, offset {k}");
            }
        }
    }

    #[test]
    fn test_single_waypoint_repeats() {
        let mut path = PathModel::new(vec![Waypoint::new(1.0, 2.0)]).unwrap();

        for _ in 0..3 {
            let step = path.next_step();
            assert_eq!((step.position, step.length), (1, 1));
        }
    }
}
