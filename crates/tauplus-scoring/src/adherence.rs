use tauplus_trajectory::{PolicyStatus, Task, Trajectory, check_policies};

/// Fraction of applicable policy constraints left unviolated.
///
/// A trajectory to which no constraint applies scores 1.0.
pub fn policy_adherence(task: &Task, trajectory: &Trajectory) -> f64 {
  let policies = task.effective_policies();
  let checks = check_policies(&policies, trajectory);

  let (applicable, satisfied) = checks
    .iter()
    .fold((0usize, 0usize), |(applicable, satisfied), check| match check.status {
      PolicyStatus::NotApplicable => (applicable, satisfied),
      PolicyStatus::Satisfied => (applicable + 1, satisfied + 1),
      PolicyStatus::Violated(_) => (applicable + 1, satisfied),
    });

  if applicable == 0 {
    1.0
  } else {
    satisfied as f64 / applicable as f64
  }
}
