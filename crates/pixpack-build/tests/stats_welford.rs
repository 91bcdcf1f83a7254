use pixpack_build::stats::OnlineStats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Two-pass reference: mean = sum/n, std = sqrt(sum((x-mean)^2)/n).
fn naive_stats(rows: &[Vec<u8>]) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len() as f64;
    let len = rows[0].len();
    let mut mean = vec![0.0f64; len];
    for row in rows {
        for (m, &v) in mean.iter_mut().zip(row) {
            *m += f64::from(v);
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }
    let mut var = vec![0.0f64; len];
    for row in rows {
        for ((s, m), &v) in var.iter_mut().zip(&mean).zip(row) {
            let d = f64::from(v) - m;
            *s += d * d;
        }
    }
    let std = var.iter().map(|s| (s / n).sqrt()).collect();
    (mean, std)
}

fn random_rows(count: usize, len: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..len).map(|_| rng.gen::<u8>()).collect())
        .collect()
}

#[test]
fn streaming_matches_two_pass_reference() {
    let rows = random_rows(500, 48, 7);
    let mut acc = OnlineStats::new(48);
    for row in &rows {
        acc.push(row).unwrap();
    }
    let result = acc.finish().unwrap();

    let (mean, std) = naive_stats(&rows);
    for i in 0..48 {
        let m = f64::from(result.mean[i]);
        let s = f64::from(result.std[i]);
        assert!(
            (m - mean[i]).abs() <= 1e-4 * mean[i].abs().max(1.0),
            "mean[{i}]: streaming {m} vs reference {}",
            mean[i]
        );
        assert!(
            (s - std[i]).abs() <= 1e-4 * std[i].abs().max(1.0),
            "std[{i}]: streaming {s} vs reference {}",
            std[i]
        );
    }
}

#[test]
fn constant_input_has_zero_std() {
    let mut acc = OnlineStats::new(16);
    for _ in 0..200 {
        acc.push(&[128u8; 16]).unwrap();
    }
    let result = acc.finish().unwrap();
    assert!(result.mean.iter().all(|&m| m == 128.0));
    assert!(result.std.iter().all(|&s| s == 0.0));
}

#[test]
fn two_point_sequence_has_known_stats() {
    // values 0 and 2: mean 1, population std 1
    let mut acc = OnlineStats::new(1);
    acc.push(&[0]).unwrap();
    acc.push(&[2]).unwrap();
    let result = acc.finish().unwrap();
    assert_eq!(result.mean, vec![1.0]);
    assert_eq!(result.std, vec![1.0]);
}
