use rand::RngCore;

use crate::config::HardwareConfig;
use crate::interface::{OrgInterface, TestCpu};

/// Everything one hardware operation may consult besides the organism itself.
///
/// Built by the caller for each call into the hardware, so operators never
/// read process-wide state and replays depend only on the supplied RNG.
pub struct ExecutionContext<'a> {
    pub config: &'a HardwareConfig,
    pub rng: &'a mut dyn RngCore,
    pub interface: &'a mut dyn OrgInterface,
    pub test_cpu: &'a mut dyn TestCpu,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        config: &'a HardwareConfig,
        rng: &'a mut dyn RngCore,
        interface: &'a mut dyn OrgInterface,
        test_cpu: &'a mut dyn TestCpu,
    ) -> Self {
        Self {
            config,
            rng,
            interface,
            test_cpu,
        }
    }
}
