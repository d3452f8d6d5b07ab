use aya::{maps::HashMap, Ebpf};
use tapflow_common::{ConfigOpt, Mode, RULE_SLOTS};

use crate::{Error, Result, CONFIG};

/// Runtime tunables shared by the kernel programs and the userspace engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub mode: Mode,
    /// Rule slots walked per packet, clamped to the table size.
    pub scan_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            scan_limit: RULE_SLOTS as u32,
        }
    }
}

pub(crate) struct ConfigHandler {
    store_name: String,
}

impl ConfigHandler {
    pub(crate) fn new() -> Result<Self> {
        Self::new_with_name(CONFIG)
    }

    fn new_with_name(map_name: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            store_name: map_name.as_ref().to_string(),
        })
    }

    pub(crate) fn set_mode(&mut self, bpf: &mut Ebpf, mode: Mode) -> Result<()> {
        let mut store = HashMap::try_from(
            bpf.map_mut(&self.store_name)
                .ok_or(Error::MapMissing(CONFIG))?,
        )?;
        store.insert(ConfigOpt::Mode, mode as u32, 0)?;
        Ok(())
    }

    pub(crate) fn set_scan_limit(&mut self, bpf: &mut Ebpf, limit: u32) -> Result<()> {
        let mut store = HashMap::try_from(
            bpf.map_mut(&self.store_name)
                .ok_or(Error::MapMissing(CONFIG))?,
        )?;
        store.insert(ConfigOpt::ScanLimit, limit.min(RULE_SLOTS as u32), 0)?;
        Ok(())
    }

    pub(crate) fn apply(&mut self, bpf: &mut Ebpf, config: &EngineConfig) -> Result<()> {
        self.set_mode(bpf, config.mode)?;
        self.set_scan_limit(bpf, config.scan_limit)
    }
}
