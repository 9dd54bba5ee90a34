//! Combinatorial estimators over per-task success counts.

/// Probability that `k` attempts drawn without replacement from `n`, of
/// which `c` succeeded, all succeed: C(c, k) / C(n, k).
///
/// Zero when `c < k`; `None` when `k` is zero or exceeds `n`.
pub fn pass_hat(n: usize, c: usize, k: usize) -> Option<f64> {
  if k == 0 || k > n || c > n {
    return None;
  }
  if c < k {
    return Some(0.0);
  }
  Some((0..k).map(|i| (c - i) as f64 / (n - i) as f64).product())
}

/// Probability that at least one of `k` drawn attempts succeeds:
/// 1 − C(n − c, k) / C(n, k).
///
/// One when `n − c < k`; `None` when `k` is zero or exceeds `n`.
pub fn pass_at(n: usize, c: usize, k: usize) -> Option<f64> {
  if k == 0 || k > n || c > n {
    return None;
  }
  let failures = n - c;
  if failures < k {
    return Some(1.0);
  }
  let all_fail: f64 = (0..k).map(|i| (failures - i) as f64 / (n - i) as f64).product();
  Some(1.0 - all_fail)
}
