/// Default gap (in points) below which two coordinates share a grid line.
pub const DEFAULT_GAP: f32 = 8.0;

/// Collapses near-duplicate coordinates into sorted cluster centroids.
///
/// Values are sorted first; a value joins the current cluster when it is
/// closer than `gap` to the previous value, so a slow drift can chain.
#[must_use]
pub fn cluster(values: &[f32], gap: f32) -> Vec<f32> {
    let mut sorted = values
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .collect::<Vec<_>>();
    sorted.sort_by(f32::total_cmp);

    let Some((&first, rest)) = sorted.split_first() else {
        return Vec::new();
    };

    let mut groups: Vec<Vec<f32>> = vec![vec![first]];
    let mut previous = first;
    for &value in rest {
        if value - previous < gap {
            if let Some(group) = groups.last_mut() {
                group.push(value);
            }
        } else {
            groups.push(vec![value]);
        }
        previous = value;
    }

    groups
        .iter()
        .map(|group| group.iter().sum::<f32>() / group.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_GAP, cluster};

    #[test]
    fn empty_input_yields_no_clusters() {
        assert!(cluster(&[], DEFAULT_GAP).is_empty());
    }

    #[test]
    fn merges_jittered_coordinates() {
        let centroids = cluster(&[250.0, 36.0, 38.0, 463.5, 248.0, 465.5], DEFAULT_GAP);
        assert_eq!(centroids, vec![37.0, 249.0, 464.5]);
    }

    #[test]
    fn reclustering_centroids_is_idempotent() {
        let inputs = [
            vec![10.0, 12.0, 17.5, 40.0, 41.0, 90.0],
            vec![0.0, 7.9, 15.8, 23.7],
            vec![5.0],
            vec![100.0, 50.0, 50.5, 200.0, 199.0],
        ];
        for values in inputs {
            let once = cluster(&values, DEFAULT_GAP);
            assert_eq!(cluster(&once, DEFAULT_GAP), once, "input: {values:?}");
        }
    }

    #[test]
    fn chains_consecutive_values_under_the_gap() {
        let centroids = cluster(&[0.0, 7.0, 14.0], DEFAULT_GAP);
        assert_eq!(centroids, vec![7.0]);
    }
}
