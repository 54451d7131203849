//! Configuration file structures
//!
//! A cell, its PHY timing, the channel access mode, the served UEs and the
//! run parameters. Files are YAML or TOML, picked by extension.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context};
use common::{Bandwidth, CellId, PlmnId, SubcarrierSpacing, Tac, TddSlotType};
use layers::mac::{CellSelectionInfo, Sib1Config, UeTraffic};
use layers::phy::{AlwaysOnAccessManager, ChannelAccessManager, DelayedAccessManager, PhyMacConfig};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GnbConfig {
    /// Cell configuration
    #[serde(default)]
    pub cell_cfg: CellConfig,
    /// PHY timing parameters
    #[serde(default)]
    pub phy: PhyTimingConfig,
    /// Channel access mode
    #[serde(default)]
    pub channel_access: ChannelAccessConfig,
    /// UEs served by the cell
    #[serde(default)]
    pub ues: Vec<UeConfig>,
    /// Run parameters
    #[serde(default)]
    pub sim: SimConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

/// Cell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellConfig {
    /// Cell ID; 0 means not configured
    pub cell_id: u16,
    /// Band number
    pub band: u16,
    /// Channel bandwidth in MHz
    #[serde(rename = "channel_bandwidth_MHz")]
    pub channel_bandwidth_mhz: u32,
    /// Common subcarrier spacing in kHz
    pub common_scs: u32,
    /// PLMN
    pub plmn: String,
    /// Tracking area code
    pub tac: u32,
    /// Extended cyclic prefix (12 symbols per slot)
    #[serde(default)]
    pub extended_cp: bool,
    /// TDD pattern announced in SIB1; empty for FDD
    #[serde(default)]
    pub tdd_pattern: Vec<TddSlotType>,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            cell_id: 1,
            band: 78,
            channel_bandwidth_mhz: 20,
            common_scs: 30,
            plmn: "00101".to_string(),
            tac: 1,
            extended_cp: false,
            tdd_pattern: Vec::new(),
        }
    }
}

/// PHY timing parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhyTimingConfig {
    #[serde(default = "default_ctrl_symbols")]
    pub dl_ctrl_symbols: u8,
    #[serde(default = "default_ctrl_symbols")]
    pub ul_ctrl_symbols: u8,
    /// Slots between a UL grant and its transmission
    #[serde(default = "default_ul_sched_delay")]
    pub ul_sched_delay: u32,
    #[serde(default = "default_rb_per_rbg")]
    pub rb_per_rbg: u32,
    #[serde(default)]
    pub cc_id: u8,
    /// Slots between a MAC control message and its transmission
    #[serde(default = "default_l1l2_ctrl_latency")]
    pub l1l2_ctrl_latency: u32,
    #[serde(default = "default_tb_decode_latency_us")]
    pub tb_decode_latency_us: u64,
    /// Zero disables beamforming refreshes
    #[serde(default = "default_beamforming_periodicity_ms")]
    pub beamforming_periodicity_ms: u64,
}

fn default_ctrl_symbols() -> u8 {
    1
}

fn default_ul_sched_delay() -> u32 {
    1
}

fn default_rb_per_rbg() -> u32 {
    4
}

fn default_l1l2_ctrl_latency() -> u32 {
    2
}

fn default_tb_decode_latency_us() -> u64 {
    100
}

fn default_beamforming_periodicity_ms() -> u64 {
    100
}

impl Default for PhyTimingConfig {
    fn default() -> Self {
        Self {
            dl_ctrl_symbols: default_ctrl_symbols(),
            ul_ctrl_symbols: default_ctrl_symbols(),
            ul_sched_delay: default_ul_sched_delay(),
            rb_per_rbg: default_rb_per_rbg(),
            cc_id: 0,
            l1l2_ctrl_latency: default_l1l2_ctrl_latency(),
            tb_decode_latency_us: default_tb_decode_latency_us(),
            beamforming_periodicity_ms: default_beamforming_periodicity_ms(),
        }
    }
}

/// Channel access mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChannelAccessConfig {
    /// Channel always available
    #[default]
    AlwaysOn,
    /// Every request is granted after a fixed delay
    Delayed { delay_us: u64, grant_duration_ms: u64 },
}

/// One served UE
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UeConfig {
    pub imsi: u64,
    pub rnti: u16,
    /// DL bytes generated per slot
    #[serde(default)]
    pub dl_pdu_bytes: usize,
}

/// Run parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Simulated time to run
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Keep a log of every PHY event
    #[serde(default)]
    pub event_log: bool,
    /// Where to write the control-message trace as JSON lines
    pub trace_file: Option<String>,
}

fn default_duration_ms() -> u64 {
    100
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { duration_ms: default_duration_ms(), event_log: false, trace_file: None }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// All layers log level
    #[serde(default = "default_log_level")]
    pub all_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { all_level: default_log_level() }
    }
}

impl GnbConfig {
    /// Load configuration from a YAML or TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => Self::from_yaml_str(&contents),
            Some("toml") => Self::from_toml_str(&contents),
            other => Err(anyhow!("unsupported configuration format {:?} for {}", other, path.display())),
        }
    }

    pub fn from_yaml_str(contents: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(contents).context("parsing YAML configuration")
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("parsing TOML configuration")
    }

    pub fn cell_id(&self) -> CellId {
        CellId(self.cell_cfg.cell_id)
    }

    /// PHY/MAC record of the cell, validated
    pub fn phy_mac_config(&self) -> anyhow::Result<PhyMacConfig> {
        let scs = SubcarrierSpacing::from_khz(self.cell_cfg.common_scs)?;
        let bandwidth = Bandwidth::from_mhz(self.cell_cfg.channel_bandwidth_mhz)?;

        let mut config = PhyMacConfig::from_scs(scs, bandwidth, self.cell_cfg.extended_cp);
        config.dl_ctrl_symbols = self.phy.dl_ctrl_symbols;
        config.ul_ctrl_symbols = self.phy.ul_ctrl_symbols;
        config.ul_sched_delay = self.phy.ul_sched_delay;
        if self.phy.rb_per_rbg != config.rb_per_rbg && self.phy.rb_per_rbg > 0 {
            let rbs = config.bandwidth_in_rbs();
            config.rb_per_rbg = self.phy.rb_per_rbg;
            config.bandwidth_in_rbg = (rbs / self.phy.rb_per_rbg).max(1) as usize;
        }
        config.cc_id = common::CcId(self.phy.cc_id);
        config.l1l2_ctrl_latency = self.phy.l1l2_ctrl_latency;
        config.tb_decode_latency = Duration::from_micros(self.phy.tb_decode_latency_us);
        config.beamforming_periodicity = Duration::from_millis(self.phy.beamforming_periodicity_ms);

        config.validate().context("invalid PHY timing configuration")?;
        Ok(config)
    }

    pub fn sib1_config(&self) -> anyhow::Result<Sib1Config> {
        Ok(Sib1Config {
            cell_id: self.cell_id(),
            plmn_id: PlmnId::parse(&self.cell_cfg.plmn)?,
            tac: Tac(self.cell_cfg.tac),
            cell_selection_info: CellSelectionInfo::default(),
            freq_band_list: vec![self.cell_cfg.band],
            tdd_pattern: self.cell_cfg.tdd_pattern.clone(),
        })
    }

    pub fn channel_access_manager(&self) -> Box<dyn ChannelAccessManager> {
        match self.channel_access {
            ChannelAccessConfig::AlwaysOn => Box::new(AlwaysOnAccessManager::default()),
            ChannelAccessConfig::Delayed { delay_us, grant_duration_ms } => Box::new(DelayedAccessManager::new(
                Duration::from_micros(delay_us),
                Duration::from_millis(grant_duration_ms),
            )),
        }
    }

    pub fn ue_traffic(&self) -> impl Iterator<Item = UeTraffic> + '_ {
        self.ues
            .iter()
            .map(|ue| UeTraffic { rnti: common::Rnti(ue.rnti), dl_pdu_bytes: ue.dl_pdu_bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_with_defaults() {
        let config = GnbConfig::from_yaml_str(
            r#"
cell_cfg:
  cell_id: 7
  band: 78
  channel_bandwidth_MHz: 40
  common_scs: 30
  plmn: "310260"
  tac: 9
channel_access:
  mode: delayed
  delay_us: 50
  grant_duration_ms: 4
ues:
  - imsi: 1010
    rnti: 17
    dl_pdu_bytes: 256
"#,
        )
        .unwrap();

        assert_eq!(config.cell_id(), CellId(7));
        assert_eq!(config.phy.l1l2_ctrl_latency, 2);
        assert_eq!(config.sim.duration_ms, 100);
        assert_eq!(config.channel_access, ChannelAccessConfig::Delayed { delay_us: 50, grant_duration_ms: 4 });
        assert_eq!(config.ue_traffic().next(), Some(UeTraffic { rnti: common::Rnti(17), dl_pdu_bytes: 256 }));

        let phy = config.phy_mac_config().unwrap();
        assert_eq!(phy.symbols_per_slot, 14);
        assert_eq!(phy.slots_per_subframe, 2);

        let sib1 = config.sib1_config().unwrap();
        assert_eq!(sib1.plmn_id.mnc_len, 3);
        assert_eq!(sib1.freq_band_list, vec![78]);
    }

    #[test]
    fn test_toml_overrides() {
        let config = GnbConfig::from_toml_str(
            r#"
[cell_cfg]
cell_id = 2
band = 3
channel_bandwidth_MHz = 10
common_scs = 15
plmn = "00101"
tac = 1
tdd_pattern = ["Dl", "S", "Ul"]

[phy]
dl_ctrl_symbols = 2
beamforming_periodicity_ms = 0

[sim]
duration_ms = 5
event_log = true
"#,
        )
        .unwrap();

        let phy = config.phy_mac_config().unwrap();
        assert_eq!(phy.dl_ctrl_symbols, 2);
        assert!(phy.beamforming_periodicity.is_zero());
        assert_eq!(config.channel_access, ChannelAccessConfig::AlwaysOn);
        assert!(config.sim.event_log);
        assert_eq!(config.cell_cfg.tdd_pattern.len(), 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = GnbConfig::default();
        config.cell_cfg.common_scs = 45;
        assert!(config.phy_mac_config().is_err());

        let mut config = GnbConfig::default();
        config.phy.l1l2_ctrl_latency = 0;
        assert!(config.phy_mac_config().is_err());

        let mut config = GnbConfig::default();
        config.cell_cfg.plmn = "abc".to_string();
        assert!(config.sib1_config().is_err());
    }
}
