/*!
 * Shared Region Tests
 * Creation, attachment, cycle reset and teardown of the named region
 */

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shm_matmul::core::limits::{INPUT_MAX, INPUT_MIN};
use shm_matmul::shm::RegionRole;
use shm_matmul::{Cell, Dims, Matrix, RegionName, SharedRegion, ShmError};

fn unique_name(tag: &str) -> RegionName {
    RegionName::new(&format!("/shm-matmul-region-{}-{}", std::process::id(), tag)).unwrap()
}

fn loaded(name: &RegionName) -> SharedRegion<4> {
    let mut region = SharedRegion::<4>::create(name).unwrap();
    region.begin_cycle(Dims::new(2, 2)).unwrap();
    let a = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
    let b = Matrix::from_rows(&[vec![5, 6], vec![7, 8]]).unwrap();
    region.load_inputs(&a, &b).unwrap();
    region
}

#[test]
fn test_attach_sees_owner_inputs() {
    let name = unique_name("attach");
    let owner = loaded(&name);
    assert_eq!(owner.role(), RegionRole::Owner);

    let attached = SharedRegion::<4>::attach(&name).unwrap();
    assert_eq!(attached.role(), RegionRole::Attached);
    assert_eq!(attached.dims().unwrap(), Dims::new(2, 2));
    assert_eq!(attached.inputs().unwrap(), owner.inputs().unwrap());
}

#[test]
fn test_attached_store_visible_to_owner() {
    let name = unique_name("store");
    let owner = loaded(&name);

    {
        let attached = SharedRegion::<4>::attach(&name).unwrap();
        let value = attached.compute_cell(Cell::new(0, 1)).unwrap();
        attached.store_cell(Cell::new(0, 1), value).unwrap();
    }

    assert!(owner.is_complete(Cell::new(0, 1)).unwrap());
    assert!(!owner.is_complete(Cell::new(0, 0)).unwrap());
    assert_eq!(owner.output().unwrap().get(0, 1), 34);
    assert_eq!(owner.completed_cells().unwrap(), 1);
    assert_eq!(
        owner.missing_cells().unwrap(),
        vec![Cell::new(0, 0), Cell::new(1, 0), Cell::new(1, 1)]
    );
}

#[test]
fn test_attach_missing_region() {
    let name = unique_name("missing");
    assert!(matches!(
        SharedRegion::<4>::attach(&name),
        Err(ShmError::NotFound(_))
    ));
}

#[test]
fn test_attach_rejects_other_capacity() {
    let name = unique_name("capacity");
    let _owner = SharedRegion::<4>::create(&name).unwrap();

    assert!(matches!(
        SharedRegion::<8>::attach(&name),
        Err(ShmError::LayoutMismatch { .. })
    ));
}

#[test]
fn test_destroy_is_idempotent_and_unlinks() {
    let name = unique_name("destroy");
    let mut region = SharedRegion::<4>::create(&name).unwrap();
    assert!(SharedRegion::<4>::exists(&name));

    region.destroy().unwrap();
    assert!(!region.is_mapped());
    assert!(!SharedRegion::<4>::exists(&name));

    region.destroy().unwrap();
    assert!(matches!(region.dims(), Err(ShmError::Detached(_))));
}

#[test]
fn test_drop_unlinks_owner_only() {
    let name = unique_name("drop");
    let owner = SharedRegion::<4>::create(&name).unwrap();

    drop(SharedRegion::<4>::attach(&name).unwrap());
    assert!(SharedRegion::<4>::exists(&name));

    drop(owner);
    assert!(!SharedRegion::<4>::exists(&name));
}

#[test]
fn test_create_recovers_stale_object() {
    let name = unique_name("stale");
    // Simulates an earlier run killed before it could unlink
    std::mem::forget(SharedRegion::<4>::create(&name).unwrap());
    assert!(SharedRegion::<4>::exists(&name));

    let mut region = SharedRegion::<4>::create(&name).unwrap();
    assert_eq!(region.cycle().unwrap(), 0);
    region.destroy().unwrap();
    assert!(!SharedRegion::<4>::exists(&name));
}

#[test]
fn test_begin_cycle_clears_flags_and_outputs() {
    let name = unique_name("reset");
    let mut region = loaded(&name);
    for cell in Dims::new(2, 2).cells_row_major() {
        let value = region.compute_cell(cell).unwrap();
        region.store_cell(cell, value).unwrap();
    }
    assert_eq!(region.completed_cells().unwrap(), 4);
    assert_eq!(region.cycle().unwrap(), 1);

    region.begin_cycle(Dims::new(3, 1)).unwrap();
    assert_eq!(region.cycle().unwrap(), 2);
    assert_eq!(region.completed_cells().unwrap(), 0);
    assert_eq!(region.output().unwrap(), Matrix::zeros(3, 3));
}

#[test]
fn test_begin_cycle_rejects_bad_dims() {
    let name = unique_name("bad-dims");
    let mut region = SharedRegion::<4>::create(&name).unwrap();

    assert!(matches!(
        region.begin_cycle(Dims::new(5, 1)),
        Err(ShmError::DimensionsExceedCapacity { capacity: 4, .. })
    ));
    assert!(region.begin_cycle(Dims::new(0, 2)).is_err());
    assert!(region.begin_cycle(Dims::new(4, 4)).is_ok());
}

#[test]
fn test_store_outside_active_square() {
    let name = unique_name("range");
    let region = loaded(&name);

    assert!(matches!(
        region.store_cell(Cell::new(2, 0), 1),
        Err(ShmError::CellOutOfRange { rows: 2, .. })
    ));
    assert!(region.compute_cell(Cell::new(0, 3)).is_err());
}

#[test]
fn test_fill_random_stays_in_input_range() {
    let name = unique_name("random");
    let mut region = SharedRegion::<4>::create(&name).unwrap();
    region.begin_cycle(Dims::new(3, 4)).unwrap();
    region.fill_random(&mut StdRng::seed_from_u64(42)).unwrap();

    let (a, b) = region.inputs().unwrap();
    assert_eq!((a.rows(), a.cols()), (4, 3));
    assert_eq!((b.rows(), b.cols()), (3, 4));
    for m in [&a, &b] {
        for row in 0..m.rows() {
            assert!(m.row(row).iter().all(|v| (INPUT_MIN..=INPUT_MAX).contains(v)));
        }
    }
}

#[test]
fn test_load_inputs_checks_shape() {
    let name = unique_name("shape");
    let mut region = SharedRegion::<4>::create(&name).unwrap();
    region.begin_cycle(Dims::new(2, 3)).unwrap();

    let square = Matrix::zeros(2, 2);
    assert!(matches!(
        region.load_inputs(&square, &square),
        Err(ShmError::LayoutMismatch { .. })
    ));
}
