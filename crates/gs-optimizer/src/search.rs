//! Exhaustive grid enumeration.

use gs_types::{HyperparameterSpace, SpaceError, TrialConfig};

/// Exhaustive grid search over a hyperparameter space.
///
/// Yields the cartesian product of all axes as a mixed-radix counter: axes
/// in declaration order, the last-declared axis varying fastest. The
/// sequence is finite and can be restarted with [`GridSearch::reset`].
#[derive(Debug, Clone)]
pub struct GridSearch {
    space: HyperparameterSpace,
    total: usize,
    cursor: usize,
}

impl GridSearch {
    pub fn new(space: HyperparameterSpace) -> Result<Self, SpaceError> {
        space.validate()?;
        let total = space.grid_size().ok_or(SpaceError::TooLarge)?;
        Ok(Self {
            space,
            total,
            cursor: 0,
        })
    }

    pub fn space(&self) -> &HyperparameterSpace {
        &self.space
    }

    /// Total number of combinations, independent of the cursor.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Rewind to the first combination.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Decode the combination at `index` in enumeration order.
    pub fn config_at(&self, index: usize) -> Option<TrialConfig> {
        if index >= self.total {
            return None;
        }

        let axes = self.space.axes();
        let mut picks = vec![0usize; axes.len()];
        let mut rem = index;
        for (slot, axis) in picks.iter_mut().zip(axes).rev() {
            *slot = rem % axis.len();
            rem /= axis.len();
        }

        Some(TrialConfig::from_pairs(
            axes.iter()
                .zip(picks)
                .map(|(axis, pick)| (axis.name.clone(), axis.values[pick].clone())),
        ))
    }
}

impl Iterator for GridSearch {
    type Item = TrialConfig;

    fn next(&mut self) -> Option<Self::Item> {
        let config = self.config_at(self.cursor)?;
        self.cursor += 1;
        Some(config)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.cursor;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridSearch {}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_types::ParameterValue;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_grid_search_scenario_order() {
        let space = HyperparameterSpace::new()
            .add_axis("lr", [0.1, 0.01])
            .add_axis("batch_size", [32, 64]);

        let rendered: Vec<String> = GridSearch::new(space)
            .unwrap()
            .map(|c| c.to_string())
            .collect();

        assert_eq!(
            rendered,
            vec![
                "lr=0.1, batch_size=32",
                "lr=0.1, batch_size=64",
                "lr=0.01, batch_size=32",
                "lr=0.01, batch_size=64",
            ]
        );
    }

    #[test]
    fn test_grid_search_rejects_empty_axis() {
        let space = HyperparameterSpace::new()
            .add_axis("lr", [0.1])
            .add_axis("momentum", Vec::<f64>::new());
        let err = GridSearch::new(space).unwrap_err();
        assert_eq!(
            err,
            SpaceError::EmptyAxis {
                axis: "momentum".into()
            }
        );
    }

    #[test]
    fn test_empty_space_yields_single_empty_config() {
        let configs: Vec<TrialConfig> = GridSearch::new(HyperparameterSpace::new())
            .unwrap()
            .collect();
        assert_eq!(configs.len(), 1);
        assert!(configs[0].is_empty());
    }

    #[test]
    fn test_grid_search_is_restartable() {
        let space = HyperparameterSpace::new().add_axis("x", [1, 2, 3, 4, 5]);
        let mut gs = GridSearch::new(space).unwrap();

        let first: Vec<TrialConfig> = gs.by_ref().take(3).collect();
        assert_eq!(gs.len(), 2);
        assert_eq!(gs.by_ref().count(), 2);
        assert!(gs.next().is_none());

        gs.reset();
        assert_eq!(gs.len(), 5);
        let again: Vec<TrialConfig> = gs.take(3).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_mixed_value_kinds_are_preserved() {
        let space = HyperparameterSpace::new()
            .add_axis("optimizer", ["adam", "sgd"])
            .add_axis("nesterov", [true, false]);
        let gs = GridSearch::new(space).unwrap();
        let last = gs.config_at(3).unwrap();
        assert_eq!(last.get("optimizer"), Some(&ParameterValue::from("sgd")));
        assert_eq!(last.get("nesterov"), Some(&ParameterValue::Bool(false)));
        assert!(gs.config_at(4).is_none());
    }

    fn space_with_sizes(sizes: &[usize]) -> HyperparameterSpace {
        sizes
            .iter()
            .enumerate()
            .fold(HyperparameterSpace::new(), |space, (i, &n)| {
                space.add_axis(format!("a{i}"), (0..n as i64).collect::<Vec<_>>())
            })
    }

    fn digits(config: &TrialConfig) -> Vec<i64> {
        config
            .iter()
            .map(|(_, v)| match v {
                ParameterValue::Int(i) => *i,
                other => panic!("unexpected value {other:?}"),
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_enumeration_is_complete_unique_and_ordered(sizes in prop::collection::vec(1usize..5, 0..5)) {
            let configs: Vec<TrialConfig> = GridSearch::new(space_with_sizes(&sizes)).unwrap().collect();

            let expected: usize = sizes.iter().product();
            prop_assert_eq!(configs.len(), expected);

            let tuples: Vec<Vec<i64>> = configs.iter().map(digits).collect();
            let unique: HashSet<&Vec<i64>> = tuples.iter().collect();
            prop_assert_eq!(unique.len(), expected);

            // Mixed-radix with the last axis fastest is lexicographic order on the picks.
            for pair in tuples.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
