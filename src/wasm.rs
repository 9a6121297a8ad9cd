use crate::bounds::BoundingBox;
use crate::bucketed::BucketedKdTree;
use crate::index::SpatialIndex;
use crate::point::{random_points, Point3};
use js_sys::{Array, Float64Array};
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_rayon::init_thread_pool;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn init_threads(n: usize) -> js_sys::Promise {
    init_thread_pool(n)
}

#[wasm_bindgen(typescript_custom_section)]
const TS_CONSTANTS_CAPACITY: &'static str = r#"
export const DEFAULT_LEAF_CAPACITY = 128;
"#;

/// Reads a `[x, y, z]` JS array into a point.
pub fn parse_js_point(val: &JsValue) -> Option<Point3> {
    let arr = val.dyn_ref::<Array>()?;
    if arr.length() < 3 {
        return None;
    }
    Some(Point3::new(
        arr.get(0).as_f64()?,
        arr.get(1).as_f64()?,
        arr.get(2).as_f64()?,
    ))
}

fn points_from_flat(coords: &[f64]) -> Vec<Point3> {
    coords
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect()
}

/// Represents an axis-aligned bounding box in 3D space.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug)]
pub struct BoundingBox3D {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

#[wasm_bindgen]
impl BoundingBox3D {
    #[wasm_bindgen(constructor)]
    pub fn new(min_x: f64, min_y: f64, min_z: f64, max_x: f64, max_y: f64, max_z: f64) -> BoundingBox3D {
        BoundingBox3D { min_x, min_y, min_z, max_x, max_y, max_z }
    }
}

impl From<BoundingBox3D> for BoundingBox {
    fn from(b: BoundingBox3D) -> Self {
        BoundingBox::new([b.min_x, b.min_y, b.min_z], [b.max_x, b.max_y, b.max_z])
    }
}

impl From<BoundingBox> for BoundingBox3D {
    fn from(b: BoundingBox) -> Self {
        BoundingBox3D::new(b.min[0], b.min[1], b.min[2], b.max[0], b.max[1], b.max[2])
    }
}

/// A bucketed KD-tree exposed to JavaScript.
///
/// Points go in and come out as flat arrays `[x, y, z, x, y, z, ...]`.
#[wasm_bindgen]
pub struct PointIndex {
    inner: BucketedKdTree,
}

#[wasm_bindgen]
impl PointIndex {
    /// Creates an empty index whose leaves hold up to `capacity` points.
    #[wasm_bindgen(constructor)]
    pub fn new(capacity: usize) -> Result<PointIndex, JsError> {
        Ok(PointIndex {
            inner: BucketedKdTree::with_capacity(capacity)?,
        })
    }

    /// Replaces the content of the index with a flat coordinate array.
    pub fn set_points(&mut self, coords: &[f64]) -> Result<(), JsError> {
        let capacity = self.inner.capacity();
        self.inner = BucketedKdTree::from_points(points_from_flat(coords), capacity)?;
        Ok(())
    }

    /// Replaces the content of the index with `count` uniformly random points in `bounds`.
    pub fn random_points(&mut self, count: usize, bounds: BoundingBox3D, seed: u64) -> Result<(), JsError> {
        let capacity = self.inner.capacity();
        let points = random_points(count, &BoundingBox::from(bounds), seed);
        self.inner = BucketedKdTree::from_points(points, capacity)?;
        Ok(())
    }

    /// Inserts a single point, rejecting NaN or infinite coordinates.
    pub fn insert(&mut self, x: f64, y: f64, z: f64) -> Result<(), JsError> {
        self.inner.try_insert(Point3::new(x, y, z))?;
        Ok(())
    }

    #[wasm_bindgen(getter)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[wasm_bindgen(getter)]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Returns a flat array of all stored coordinates.
    #[wasm_bindgen(getter)]
    pub fn points(&self) -> Vec<f64> {
        self.inner.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
    }

    /// The accumulated extent of the stored points, if any.
    pub fn bounds(&self) -> Option<BoundingBox3D> {
        self.inner.bounds().map(BoundingBox3D::from)
    }

    pub fn find_exact(&self, x: f64, y: f64, z: f64) -> bool {
        self.inner.find_exact(&Point3::new(x, y, z)).is_some()
    }

    /// Same as `find_exact`, taking a `[x, y, z]` array.
    #[wasm_bindgen(js_name = findExactPoint)]
    pub fn find_exact_point(&self, point: JsValue) -> Result<bool, JsError> {
        let p = parse_js_point(&point).ok_or_else(|| JsError::new("expected an array [x, y, z]"))?;
        Ok(self.inner.find_exact(&p).is_some())
    }

    /// Returns `[x, y, z]` of some stored point within `eps`, if there is one.
    pub fn find_within(&self, x: f64, y: f64, z: f64, eps: f64) -> Option<Vec<f64>> {
        self.inner
            .find_within(&Point3::new(x, y, z), eps)
            .map(|p| vec![p.x, p.y, p.z])
    }

    /// Returns `[x, y, z, distance]` of the closest stored point, if the index is not empty.
    pub fn nearest(&self, x: f64, y: f64, z: f64) -> Option<Vec<f64>> {
        self.inner
            .nearest(&Point3::new(x, y, z))
            .map(|n| vec![n.point.x, n.point.y, n.point.z, n.distance])
    }

    /// Nearest neighbors for a flat array of queries, computed in parallel.
    ///
    /// The result holds `[x, y, z, distance]` per query, NaN-filled when the index is empty.
    pub fn nearest_many(&self, queries: &[f64]) -> Float64Array {
        let results = self.inner.nearest_many(&points_from_flat(queries));
        let flat: Vec<f64> = results
            .iter()
            .flat_map(|r| match r {
                Some(n) => [n.point.x, n.point.y, n.point.z, n.distance],
                None => [f64::NAN; 4],
            })
            .collect();
        Float64Array::from(&flat[..])
    }

    /// Logs the tree structure through `tracing` at debug level.
    pub fn dump(&self) {
        self.inner.dump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_from_flat() {
        let coords = [0.0, 1.0, 2.0, -3.0, 4.5, 6.0];
        assert_eq!(
            points_from_flat(&coords),
            vec![Point3::new(0.0, 1.0, 2.0), Point3::new(-3.0, 4.5, 6.0)]
        );
        assert!(points_from_flat(&[]).is_empty());
    }

    #[test]
    fn test_points_from_flat_drops_partial_tail() {
        let coords = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(points_from_flat(&coords), vec![Point3::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn test_bounding_box_conversion() {
        let js = BoundingBox3D::new(-1.0, -2.0, -3.0, 1.0, 2.0, 3.0);
        let bounds = BoundingBox::from(js);
        assert_eq!(bounds.min, [-1.0, -2.0, -3.0]);
        assert_eq!(bounds.max, [1.0, 2.0, 3.0]);

        let back = BoundingBox3D::from(bounds);
        assert_eq!(back.max_z, 3.0);
    }
}
