use serde::{Deserialize, Serialize};
use tauplus_config::{Band, EfficiencyBands};
use tauplus_trajectory::Trajectory;

/// Score for a count against a band: 1.0 up to the upper edge, falling
/// linearly to `floor` at the saturation point and staying there.
///
/// Counts below the lower edge are not penalised; a short conversation that
/// reached the goal is still efficient.
pub fn band_factor(count: u32, band: &Band, floor: f64) -> f64 {
  if count <= band.upper {
    return 1.0;
  }
  if count >= band.saturation {
    return floor;
  }
  let span = (band.saturation - band.upper) as f64;
  let progress = (count - band.upper) as f64 / span;
  1.0 - progress * (1.0 - floor)
}

/// The factors that multiply into the efficiency score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyBreakdown {
  pub turn_factor: f64,
  pub tool_factor: f64,
  pub tool_success_rate: f64,
  pub premature_transfer: bool,
  pub score: f64,
}

pub fn efficiency(
  bands: &EfficiencyBands,
  trajectory: &Trajectory,
  premature_transfer: bool,
) -> EfficiencyBreakdown {
  let turns = trajectory.turn_count();
  let tool_calls = trajectory.tool_call_count();

  let mut turn_factor = if turns == 0 {
    0.0
  } else {
    band_factor(turns, &bands.turns, bands.floor)
  };
  if premature_transfer {
    turn_factor *= bands.transfer_penalty;
  }

  let tool_factor = if tool_calls == 0 {
    bands.idle_tool_score
  } else {
    band_factor(tool_calls, &bands.tool_calls, bands.floor)
  };

  let tool_success_rate = trajectory.tool_success_rate();
  let score = (turn_factor * tool_factor * tool_success_rate).clamp(0.0, 1.0);

  EfficiencyBreakdown {
    turn_factor,
    tool_factor,
    tool_success_rate,
    premature_transfer,
    score,
  }
}
