// SPDX-License-Identifier: Apache-2.0

use nalgebra::DVector;

/// A linear constraint on the positions of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Constraint {
    /// `x[index] >= bound`
    AtLeast { index: usize, bound: f64 },
    /// `x[index] <= bound`
    AtMost { index: usize, bound: f64 },
    /// `x[after] - x[before] >= gap`
    Separation { before: usize, after: usize, gap: f64 },
}

/// Minimize `sum(weight[i] * (x[i] - target[i])^2)` subject to `constraints`.
#[derive(Debug, Clone)]
pub(crate) struct DisplacementProblem {
    pub(crate) targets: DVector<f64>,
    pub(crate) weights: DVector<f64>,
    pub(crate) constraints: Vec<Constraint>,
}

/// Hildreth's method: coordinate ascent on the dual, one constraint at a
/// time. Stops after `sweeps` passes or once no constraint is violated by
/// more than `tolerance`. If the constraints are inconsistent the last
/// iterate is returned.
pub(crate) fn solve(problem: &DisplacementProblem, sweeps: usize, tolerance: f64) -> DVector<f64> {
    let mut x = problem.targets.clone();
    let inverse = problem.weights.map(|w| 0.5 / w);
    let mut multipliers = vec![0.0; problem.constraints.len()];

    for _ in 0..sweeps {
        let mut worst: f64 = 0.0;
        for (k, constraint) in problem.constraints.iter().enumerate() {
            let (residual, curvature) = match *constraint {
                Constraint::AtLeast { index, bound } => (bound - x[index], inverse[index]),
                Constraint::AtMost { index, bound } => (x[index] - bound, inverse[index]),
                Constraint::Separation { before, after, gap } => {
                    (gap - (x[after] - x[before]), inverse[before] + inverse[after])
                }
            };
            worst = worst.max(residual);

            let step = (residual / curvature).max(-multipliers[k]);
            if step == 0.0 {
                continue;
            }
            multipliers[k] += step;
            match *constraint {
                Constraint::AtLeast { index, .. } => x[index] += step * inverse[index],
                Constraint::AtMost { index, .. } => x[index] -= step * inverse[index],
                Constraint::Separation { before, after, .. } => {
                    x[after] += step * inverse[after];
                    x[before] -= step * inverse[before];
                }
            }
        }
        if worst <= tolerance {
            break;
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separation_splits_evenly() {
        let problem = DisplacementProblem {
            targets: DVector::from_vec(vec![16.0, 16.0]),
            weights: DVector::from_vec(vec![1.0, 1.0]),
            constraints: vec![Constraint::Separation {
                before: 0,
                after: 1,
                gap: 10.0,
            }],
        };
        let x = solve(&problem, 100, 1e-9);
        assert!((x[0] - 11.0).abs() < 1e-6);
        assert!((x[1] - 21.0).abs() < 1e-6);
    }

    #[test]
    fn heavier_cell_moves_less() {
        let problem = DisplacementProblem {
            targets: DVector::from_vec(vec![0.0, 0.0]),
            weights: DVector::from_vec(vec![3.0, 1.0]),
            constraints: vec![Constraint::Separation {
                before: 0,
                after: 1,
                gap: 8.0,
            }],
        };
        let x = solve(&problem, 100, 1e-9);
        assert!((x[0] + 2.0).abs() < 1e-6);
        assert!((x[1] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn bounds_are_respected() {
        let problem = DisplacementProblem {
            targets: DVector::from_vec(vec![-5.0, 95.0]),
            weights: DVector::from_vec(vec![1.0, 1.0]),
            constraints: vec![
                Constraint::AtLeast {
                    index: 0,
                    bound: 0.0,
                },
                Constraint::AtMost {
                    index: 1,
                    bound: 90.0,
                },
            ],
        };
        let x = solve(&problem, 100, 1e-9);
        assert!((x[0] - 0.0).abs() < 1e-6);
        assert!((x[1] - 90.0).abs() < 1e-6);
    }
}
