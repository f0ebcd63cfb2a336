//! Distributed slab FFT validation
//!
//! The transposes between x-slabs and y-slabs must be invisible: every task
//! ends up holding exactly the modes a single task would compute for its
//! planes, and the inverse restores the input scaled by N^3.

use std::thread;

use cola_kernel::{Complex, Real, SingleTask, SlabFft, SlabField, SlabPartition};
use cola_orchestrator::ThreadComm;

fn global_values(n: usize) -> Vec<Real> {
    (0..n * n * n)
        .map(|i| ((i * 13 % 17) as Real) * 0.125 - 1.0 + (i % 5) as Real * 0.01)
        .collect()
}

fn single_task_modes(n: usize) -> Vec<Complex<Real>> {
    let mut field = SlabField::zeroed(n, 0, n).unwrap();
    field.load_real(&global_values(n)).unwrap();
    let mut fft = SlabFft::new(SlabPartition::balanced(n, 1).unwrap(), 0);
    fft.forward(&mut field, &mut SingleTask::new()).unwrap();
    field.modes().unwrap().to_vec()
}

/// Forward then inverse on every task; returns (modes, round trip) per task.
fn distributed_transform(n: usize, tasks: usize) -> Vec<(Vec<Complex<Real>>, Vec<Real>)> {
    let partition = SlabPartition::balanced(n, tasks).unwrap();
    let values = global_values(n);
    let plane = n * n;

    thread::scope(|scope| {
        let handles: Vec<_> = ThreadComm::group(tasks)
            .into_iter()
            .enumerate()
            .map(|(rank, mut comm)| {
                let partition = partition.clone();
                let values = &values;
                scope.spawn(move || {
                    let (start, count) = partition.slices_owned(rank);
                    let mut field = SlabField::zeroed(n, start, count).unwrap();
                    field
                        .load_real(&values[start * plane..(start + count) * plane])
                        .unwrap();
                    let mut fft = SlabFft::new(partition, rank);
                    fft.forward(&mut field, &mut comm).unwrap();
                    let modes = field.modes().unwrap().to_vec();
                    fft.inverse(&mut field, &mut comm).unwrap();
                    (modes, field.real_values().unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn distributed_forward_matches_single_task() {
    let n = 6;
    let reference = single_task_modes(n);
    let plane = n * n;
    let tolerance = 1e-6 * (n * n * n) as Real;

    for tasks in [2, 3, 4] {
        let partition = SlabPartition::balanced(n, tasks).unwrap();
        let results = distributed_transform(n, tasks);
        for (rank, (modes, _)) in results.iter().enumerate() {
            let (start, count) = partition.slices_owned(rank);
            assert_eq!(modes.len(), count * plane);
            for (i, m) in modes.iter().enumerate() {
                let expected = reference[start * plane + i];
                assert!(
                    (m - expected).norm() < tolerance,
                    "{} tasks, rank {}: mode {} is {} instead of {}",
                    tasks,
                    rank,
                    start * plane + i,
                    m,
                    expected
                );
            }
        }
    }
}

#[test]
fn distributed_round_trip_scales_by_grid_volume() {
    let n = 8;
    let tasks = 3;
    let partition = SlabPartition::balanced(n, tasks).unwrap();
    let values = global_values(n);
    let plane = n * n;
    let scale = (n * n * n) as Real;

    for (rank, (_, round_trip)) in distributed_transform(n, tasks).iter().enumerate() {
        let (start, _) = partition.slices_owned(rank);
        for (i, v) in round_trip.iter().enumerate() {
            let original = values[start * plane + i];
            assert!((v / scale - original).abs() < 1e-4, "rank {} value {}", rank, i);
        }
    }
}
