//! Candidate diversification.
//!
//! All functions work on indices into a candidate list: `relevance[i]` is the
//! similarity of candidate `i` to the document and `vectors[i]` its
//! embedding. Ties are always broken toward the lower index.

use itertools::Itertools;

use super::embed::cosine;

/// Above this many combinations max-sum switches to a greedy search.
pub const MAX_EXACT_COMBINATIONS: u128 = 10_000;

/// Indices ordered by relevance, most relevant first.
pub fn rank(relevance: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..relevance.len()).collect();
    order.sort_by(|&a, &b| relevance[b].total_cmp(&relevance[a]).then(a.cmp(&b)));
    order
}

/// Max-sum pass then MMR: take the `nr_candidates` most relevant, keep the
/// `2 * top_n` least similar to each other, then pick `top_n` of those with
/// maximal marginal relevance.
pub fn diversify(
    relevance: &[f32],
    vectors: &[Vec<f32>],
    top_n: usize,
    nr_candidates: usize,
    diversity: f32,
) -> Vec<usize> {
    if top_n == 0 || relevance.is_empty() {
        return Vec::new();
    }
    let mut pool = rank(relevance);
    pool.truncate(nr_candidates.max(top_n));

    let spread = max_sum(vectors, &pool, 2 * top_n);
    mmr(relevance, vectors, &spread, top_n, diversity)
}

/// The `k` members of `pool` whose pairwise similarity sum is smallest.
/// Returned in pool order.
pub fn max_sum(vectors: &[Vec<f32>], pool: &[usize], k: usize) -> Vec<usize> {
    if pool.len() <= k {
        return pool.to_vec();
    }
    if k == 0 {
        return Vec::new();
    }

    // similarities between pool positions, computed once
    let sim = similarity_matrix(vectors, pool);

    let picked: Vec<usize> = if combinations(pool.len(), k) <= MAX_EXACT_COMBINATIONS {
        let mut best: Option<(f32, Vec<usize>)> = None;
        for combo in (0..pool.len()).combinations(k) {
            let sum: f32 = combo
                .iter()
                .tuple_combinations()
                .map(|(&a, &b)| sim[a][b])
                .sum();
            if best.as_ref().map_or(true, |(s, _)| sum < *s) {
                best = Some((sum, combo));
            }
        }
        best.map(|(_, combo)| combo).unwrap_or_default()
    } else {
        // greedy: seed with the most relevant, then add whichever candidate
        // adds the least similarity to the chosen set
        let mut chosen = vec![0];
        let mut rest: Vec<usize> = (1..pool.len()).collect();
        while chosen.len() < k && !rest.is_empty() {
            let (pos, _) = rest
                .iter()
                .enumerate()
                .map(|(pos, &c)| (pos, chosen.iter().map(|&s| sim[c][s]).sum::<f32>()))
                .fold(None, |best: Option<(usize, f32)>, (pos, cost)| match best {
                    Some((_, b)) if b <= cost => best,
                    _ => Some((pos, cost)),
                })
                .unwrap_or((0, 0.0));
            chosen.push(rest.remove(pos));
        }
        chosen.sort_unstable();
        chosen
    };
    picked.into_iter().map(|pos| pool[pos]).collect()
}

fn similarity_matrix(vectors: &[Vec<f32>], pool: &[usize]) -> Vec<Vec<f32>> {
    let n = pool.len();
    let mut sim = vec![vec![0.0; n]; n];
    for (a, b) in (0..n).tuple_combinations() {
        let s = cosine(&vectors[pool[a]], &vectors[pool[b]]);
        sim[a][b] = s;
        sim[b][a] = s;
    }
    sim
}

/// Maximal marginal relevance over `pool`:
/// `(1 - diversity) * relevance - diversity * max_similarity_to_selected`.
pub fn mmr(
    relevance: &[f32],
    vectors: &[Vec<f32>],
    pool: &[usize],
    top_n: usize,
    diversity: f32,
) -> Vec<usize> {
    let mut rest: Vec<usize> = pool.to_vec();
    rest.sort_by(|&a, &b| relevance[b].total_cmp(&relevance[a]).then(a.cmp(&b)));
    if rest.is_empty() || top_n == 0 {
        return Vec::new();
    }

    let mut selected = vec![rest.remove(0)];
    while selected.len() < top_n && !rest.is_empty() {
        let mut best: Option<(usize, f32)> = None;
        for (pos, &c) in rest.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine(&vectors[c], &vectors[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let score = (1.0 - diversity) * relevance[c] - diversity * redundancy;
            let better = match best {
                None => true,
                Some((bp, bs)) => score > bs || (score == bs && c < rest[bp]),
            };
            if better {
                best = Some((pos, score));
            }
        }
        match best {
            Some((pos, _)) => selected.push(rest.remove(pos)),
            None => break,
        }
    }
    selected
}

fn combinations(n: usize, k: usize) -> u128 {
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
        if acc > MAX_EXACT_COMBINATIONS {
            return acc;
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(x: f32, y: f32) -> Vec<f32> {
        let n = (x * x + y * y).sqrt();
        vec![x / n, y / n]
    }

    #[test]
    fn rank_breaks_ties_by_index() {
        assert_eq!(rank(&[0.2, 0.9, 0.2, 0.5]), vec![1, 3, 0, 2]);
    }

    #[test]
    fn combination_count() {
        assert_eq!(combinations(5, 2), 10);
        assert_eq!(combinations(20, 3), 1140);
        assert_eq!(combinations(16, 10), 8008);
        assert!(combinations(19, 10) > MAX_EXACT_COMBINATIONS);
        assert!(combinations(20, 10) > MAX_EXACT_COMBINATIONS);
        assert_eq!(combinations(10, 10), 1);
    }

    #[test]
    fn max_sum_prefers_dissimilar_members() {
        // 0 and 1 are near-duplicates; 2 points elsewhere
        let vectors = vec![unit(1.0, 0.0), unit(1.0, 0.05), unit(0.0, 1.0)];
        assert_eq!(max_sum(&vectors, &[0, 1, 2], 2), vec![0, 2]);
    }

    #[test]
    fn max_sum_keeps_small_pools_whole() {
        let vectors = vec![unit(1.0, 0.0), unit(0.0, 1.0)];
        assert_eq!(max_sum(&vectors, &[1, 0], 4), vec![1, 0]);
    }

    #[test]
    fn greedy_max_sum_returns_k_members() {
        let vectors: Vec<Vec<f32>> = (0..24)
            .map(|i| unit((i as f32).cos(), (i as f32).sin()))
            .collect();
        let pool: Vec<usize> = (0..24).collect();
        // C(24, 12) is far above the exact-search limit
        let picked = max_sum(&vectors, &pool, 12);
        assert_eq!(picked.len(), 12);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn exact_and_greedy_agree_on_a_clear_split() {
        // two tight clusters; any low-similarity pair takes one from each
        let vectors = vec![
            unit(1.0, 0.0),
            unit(1.0, 0.02),
            unit(1.0, 0.04),
            unit(0.0, 1.0),
        ];
        assert_eq!(max_sum(&vectors, &[0, 1, 2, 3], 2), vec![0, 3]);
    }

    #[test]
    fn nineteen_candidates_stay_fast() {
        let vectors: Vec<Vec<f32>> = (0..19)
            .map(|i| {
                let mut v = vec![0.0; 512];
                v[i * 7 % 512] = 1.0;
                v[(i * 13 + 1) % 512] = 0.5;
                v
            })
            .collect();
        let pool: Vec<usize> = (0..19).collect();
        let start = std::time::Instant::now();
        let picked = max_sum(&vectors, &pool, 10);
        assert_eq!(picked.len(), 10);
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn mmr_without_diversity_is_relevance_order() {
        let vectors = vec![unit(1.0, 0.0), unit(1.0, 0.01), unit(0.0, 1.0)];
        let relevance = [0.9, 0.8, 0.1];
        assert_eq!(mmr(&relevance, &vectors, &[0, 1, 2], 2, 0.0), vec![0, 1]);
    }

    #[test]
    fn mmr_with_diversity_skips_redundant_candidates() {
        let vectors = vec![unit(1.0, 0.0), unit(1.0, 0.01), unit(0.0, 1.0)];
        let relevance = [0.9, 0.8, 0.5];
        assert_eq!(mmr(&relevance, &vectors, &[0, 1, 2], 2, 0.5), vec![0, 2]);
    }

    #[test]
    fn diversify_never_exceeds_top_n() {
        let vectors: Vec<Vec<f32>> = (0..8).map(|i| unit(1.0, i as f32)).collect();
        let relevance: Vec<f32> = (0..8).map(|i| 1.0 - i as f32 / 10.0).collect();
        assert_eq!(diversify(&relevance, &vectors, 5, 20, 0.5).len(), 5);
        assert_eq!(diversify(&relevance[..3], &vectors[..3], 5, 20, 0.5).len(), 3);
        assert!(diversify(&[], &[], 5, 20, 0.5).is_empty());
    }
}
