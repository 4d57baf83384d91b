//! Daemon configuration, built from CLI flags.

use clap::{App, Arg};
use std::time::Duration;

use crate::discovery::{DEFAULT_BACKOFF, DEFAULT_RETRIES};
use crate::engine::TICK_PERIOD;
use crate::log::LogLevel;

/// GPIO chip-select assignment for one slot: `(chip_offset)` on the board's
/// default GPIO controller.
pub struct Config {
    pub spi_bus: u8,
    pub chip_select_offsets: [u8; crate::slave::MAX_SLAVES],
    pub tick_period: Duration,
    pub discovery_retries: u8,
    pub discovery_backoff: Duration,
    pub log_level: LogLevel,
}

/// Default chip-select GPIO offsets for the RED Brick's 8 SPI slots, in
/// stack-address order.
const DEFAULT_CS_OFFSETS: [u8; crate::slave::MAX_SLAVES] = [4, 17, 27, 22, 5, 6, 13, 19];

impl Default for Config {
    fn default() -> Self {
        Config {
            spi_bus: 0,
            chip_select_offsets: DEFAULT_CS_OFFSETS,
            tick_period: TICK_PERIOD,
            discovery_retries: DEFAULT_RETRIES,
            discovery_backoff: DEFAULT_BACKOFF,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    pub fn from_cmd_line_args() -> Self {
        let defaults = Config::default();
        let default_bus = defaults.spi_bus.to_string();
        let default_cs_base = defaults.chip_select_offsets[0].to_string();
        let default_retries = defaults.discovery_retries.to_string();
        let default_backoff = defaults.discovery_backoff.as_millis().to_string();
        let default_tick_us = defaults.tick_period.as_micros().to_string();

        let matches = App::new("red-stackd")
            .about("SPI stack subsystem bridge for the RED Brick controller board")
            .arg(
                Arg::with_name("spi_bus")
                    .long("spi-bus")
                    .takes_value(true)
                    .default_value(&default_bus)
                    .help("SPI bus number (/dev/spidevN.0)"),
            )
            .arg(
                Arg::with_name("cs_base_offset")
                    .long("cs-base-offset")
                    .takes_value(true)
                    .default_value(&default_cs_base)
                    .help("GPIO offset of stack slot 0's chip-select line; slots 1-7 follow the built-in board layout from there"),
            )
            .arg(
                Arg::with_name("tick_period_us")
                    .long("tick-period-us")
                    .takes_value(true)
                    .default_value(&default_tick_us)
                    .help("Polling engine tick period, in microseconds"),
            )
            .arg(
                Arg::with_name("discovery_retries")
                    .long("discovery-retries")
                    .takes_value(true)
                    .default_value(&default_retries)
                    .help("Send/receive attempts per slot during discovery"),
            )
            .arg(
                Arg::with_name("discovery_backoff_ms")
                    .long("discovery-backoff-ms")
                    .takes_value(true)
                    .default_value(&default_backoff)
                    .help("Backoff between discovery attempts, in milliseconds"),
            )
            .arg(
                Arg::with_name("verbosity")
                    .short("v")
                    .multiple(true)
                    .help("Increases log verbosity (repeatable: -v, -vv, -vvv, -vvvv)"),
            )
            .get_matches();

        let spi_bus = matches
            .value_of("spi_bus")
            .unwrap()
            .parse()
            .unwrap_or(defaults.spi_bus);
        let cs_base_offset: u8 = matches
            .value_of("cs_base_offset")
            .unwrap()
            .parse()
            .unwrap_or(defaults.chip_select_offsets[0]);
        let chip_select_offsets = shift_cs_offsets(&defaults.chip_select_offsets, cs_base_offset);
        let tick_period_us: u64 = matches
            .value_of("tick_period_us")
            .unwrap()
            .parse()
            .unwrap_or(defaults.tick_period.as_micros() as u64);
        let discovery_retries = matches
            .value_of("discovery_retries")
            .unwrap()
            .parse()
            .unwrap_or(defaults.discovery_retries);
        let discovery_backoff_ms: u64 = matches
            .value_of("discovery_backoff_ms")
            .unwrap()
            .parse()
            .unwrap_or(defaults.discovery_backoff.as_millis() as u64);
        let log_level = LogLevel::from_verbosity(matches.occurrences_of("verbosity") as u8);

        Config {
            spi_bus,
            chip_select_offsets,
            tick_period: Duration::from_micros(tick_period_us),
            discovery_retries,
            discovery_backoff: Duration::from_millis(discovery_backoff_ms),
            log_level,
        }
    }
}

/// Re-bases a default offset layout so slot 0 lands on `base`, preserving
/// the spacing between slots.
fn shift_cs_offsets(
    defaults: &[u8; crate::slave::MAX_SLAVES],
    base: u8,
) -> [u8; crate::slave::MAX_SLAVES] {
    let shift = base.wrapping_sub(defaults[0]);
    let mut offsets = *defaults;
    for offset in &mut offsets {
        *offset = offset.wrapping_add(shift);
    }
    offsets
}
