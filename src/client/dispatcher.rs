use parking_lot::Mutex;

use crate::config::ConnectionParams;
use crate::errors::Error;

// -----------------------------------------------------------------------------
// ----- ConnectionDispatcher --------------------------------------------------

#[derive(Debug)]
pub struct ConnectionDispatcher {
    endpoints: Vec<ConnectionParams>,
    cursor: Mutex<usize>,
}

impl ConnectionDispatcher {
    pub fn new(endpoints: Vec<ConnectionParams>) -> Result<Self, Error> {
        if endpoints.is_empty() {
            return Err(Error::Config("dispatcher needs at least one endpoint".into()));
        }
        for params in &endpoints {
            params.validate()?;
        }
        Ok(Self {
            endpoints,
            cursor: Mutex::new(0),
        })
    }

    /// Reads the endpoint at the cursor and advances it modulo N, both under
    /// one lock.
    pub fn next_endpoint(&self) -> ConnectionParams {
        let mut cursor = self.cursor.lock();
        let params = self.endpoints[*cursor].clone();
        *cursor = (*cursor + 1) % self.endpoints.len();
        params
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(n: u16) -> Vec<ConnectionParams> {
        (0..n)
            .map(|i| ConnectionParams::new("host", 9000 + i))
            .collect()
    }

    #[test]
    fn empty_endpoint_list_is_rejected() {
        assert!(matches!(
            ConnectionDispatcher::new(Vec::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn n_calls_visit_each_endpoint_once_in_order() {
        let d = ConnectionDispatcher::new(endpoints(3)).unwrap();
        let ports: Vec<u16> = (0..3).map(|_| d.next_endpoint().port).collect();
        assert_eq!(ports, [9000, 9001, 9002]);
    }

    #[test]
    fn call_n_plus_one_wraps_to_the_first() {
        let d = ConnectionDispatcher::new(endpoints(3)).unwrap();
        for _ in 0..3 {
            d.next_endpoint();
        }
        assert_eq!(d.next_endpoint().port, 9000);
    }

    #[test]
    fn single_endpoint_repeats() {
        let d = ConnectionDispatcher::new(endpoints(1)).unwrap();
        assert_eq!(d.next_endpoint().port, 9000);
        assert_eq!(d.next_endpoint().port, 9000);
    }
}
