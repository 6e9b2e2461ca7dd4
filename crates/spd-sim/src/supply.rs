//! Virtual power supply state machine

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-channel setpoints and output state
#[derive(Debug, Clone, Copy)]
struct ChannelState {
    set_voltage: f64,
    set_current: f64,
    output_on: bool,
}

/// Configuration for creating a virtual supply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualSupplyConfig {
    /// Identification string returned for `*IDN?`
    pub idn: String,
    /// Initial channel 1 voltage setpoint
    pub ch1_voltage: f64,
    /// Initial channel 1 current limit
    pub ch1_current: f64,
    /// Initial channel 2 voltage setpoint
    pub ch2_voltage: f64,
    /// Initial channel 2 current limit
    pub ch2_current: f64,
    /// Whether outputs start enabled
    pub outputs_on: bool,
}

impl Default for VirtualSupplyConfig {
    fn default() -> Self {
        Self {
            idn: "Siglent Technologies,SPD3303X,SPD3XIDD1R0001,1.01.01.02.05,V3.0".to_string(),
            ch1_voltage: 12.0,
            ch1_current: 0.5,
            ch2_voltage: 5.0,
            ch2_current: 0.25,
            outputs_on: true,
        }
    }
}

/// A simulated SPD3303X
///
/// Understands the SCPI subset the bridge relays: identification, the four
/// measurement queries, setpoint writes, and output switching. Measured
/// values track the setpoints while an output is on and read zero when off.
#[derive(Debug)]
pub struct VirtualSupply {
    idn: String,
    channels: [ChannelState; 2],
}

impl VirtualSupply {
    /// Create a supply with default setpoints
    pub fn new() -> Self {
        Self::from_config(VirtualSupplyConfig::default())
    }

    /// Create a supply from configuration
    pub fn from_config(config: VirtualSupplyConfig) -> Self {
        Self {
            idn: config.idn,
            channels: [
                ChannelState {
                    set_voltage: config.ch1_voltage,
                    set_current: config.ch1_current,
                    output_on: config.outputs_on,
                },
                ChannelState {
                    set_voltage: config.ch2_voltage,
                    set_current: config.ch2_current,
                    output_on: config.outputs_on,
                },
            ],
        }
    }

    /// Process one command line; queries return the reply text
    pub fn handle_command(&mut self, line: &str) -> Option<String> {
        let cmd = line.trim();
        if cmd.is_empty() {
            return None;
        }
        let upper = cmd.to_ascii_uppercase();

        if upper == "*IDN?" {
            return Some(self.idn.clone());
        }

        if let Some(channel) = parse_measurement_query(&upper) {
            let state = &self.channels[channel.index];
            let value = if !state.output_on {
                0.0
            } else if channel.voltage {
                state.set_voltage
            } else {
                state.set_current
            };
            return Some(format!("{value:.3}"));
        }

        if let Some((index, voltage, value)) = parse_setpoint(&upper) {
            let state = &mut self.channels[index];
            if voltage {
                state.set_voltage = value;
            } else {
                state.set_current = value;
            }
            debug!("Setpoint update: {}", cmd);
            return None;
        }

        if let Some((index, on)) = parse_output(&upper) {
            self.channels[index].output_on = on;
            debug!("Output {} -> {}", index + 1, on);
            return None;
        }

        debug!("Ignoring unrecognized command: {}", cmd);
        None
    }

    /// Current voltage setpoint for a channel (1-based)
    pub fn voltage_setpoint(&self, channel: usize) -> f64 {
        self.channels[channel - 1].set_voltage
    }

    /// Current limit setpoint for a channel (1-based)
    pub fn current_setpoint(&self, channel: usize) -> f64 {
        self.channels[channel - 1].set_current
    }

    /// Whether a channel's output is on (1-based)
    pub fn output_on(&self, channel: usize) -> bool {
        self.channels[channel - 1].output_on
    }
}

impl Default for VirtualSupply {
    fn default() -> Self {
        Self::new()
    }
}

struct MeasQuery {
    index: usize,
    voltage: bool,
}

/// `MEASure:VOLTage? CHn` / `MEASure:CURRent? CHn`, long or short form
fn parse_measurement_query(upper: &str) -> Option<MeasQuery> {
    let rest = upper.strip_prefix("MEAS")?;
    let rest = rest.strip_prefix("URE").unwrap_or(rest);
    let rest = rest.strip_prefix(':')?;

    let (voltage, rest) = if let Some(r) = rest.strip_prefix("VOLT") {
        (true, r)
    } else if let Some(r) = rest.strip_prefix("CURR") {
        (false, r)
    } else {
        return None;
    };
    let rest = rest
        .strip_prefix("AGE")
        .or_else(|| rest.strip_prefix("ENT"))
        .unwrap_or(rest);
    let rest = rest.strip_prefix('?')?;

    let index = match rest.trim() {
        "CH1" => 0,
        "CH2" => 1,
        _ => return None,
    };
    Some(MeasQuery { index, voltage })
}

/// `CHn:VOLTage <v>` / `CHn:CURRent <v>`
fn parse_setpoint(upper: &str) -> Option<(usize, bool, f64)> {
    let rest = upper.strip_prefix("CH")?;
    let (index, rest) = match rest.as_bytes().first()? {
        b'1' => (0, &rest[1..]),
        b'2' => (1, &rest[1..]),
        _ => return None,
    };
    let rest = rest.strip_prefix(':')?;

    let (voltage, rest) = if let Some(r) = rest.strip_prefix("VOLT") {
        (true, r)
    } else if let Some(r) = rest.strip_prefix("CURR") {
        (false, r)
    } else {
        return None;
    };
    let rest = rest
        .strip_prefix("AGE")
        .or_else(|| rest.strip_prefix("ENT"))
        .unwrap_or(rest);

    let value = rest.trim().parse::<f64>().ok()?;
    Some((index, voltage, value))
}

/// `OUTPut CHn,ON|OFF`
fn parse_output(upper: &str) -> Option<(usize, bool)> {
    let rest = upper.strip_prefix("OUTP")?;
    let rest = rest.strip_prefix("UT").unwrap_or(rest);
    let args = rest.trim();

    let (channel, switch) = args.split_once(',')?;
    let index = match channel.trim() {
        "CH1" => 0,
        "CH2" => 1,
        _ => return None,
    };
    let on = match switch.trim() {
        "ON" => true,
        "OFF" => false,
        _ => return None,
    };
    Some((index, on))
}
