//! Uniform bucket grid used to deduplicate coordinates and to accelerate
//! nearest-neighbour lookups.
//!
//! Buckets are addressed by integer `(column, row)` pairs obtained by flooring
//! longitude and latitude divided by the bucket size (in degrees). Lookups scan
//! the 3×3 neighbourhood around the query bucket, so the bucket size must be
//! at least as large as the merge radius expressed in degrees.

use std::collections::HashMap;

use crate::geo::Coordinate;

/// Integer address of a grid bucket.
pub type BucketKey = (i64, i64);

/// Hash map from bucket address to the items stored in it.
#[derive(Debug, Clone)]
pub struct BucketGrid<T> {
    bucket_size: f64,
    buckets: HashMap<BucketKey, Vec<T>>,
    len: usize,
}

impl<T: Copy> BucketGrid<T> {
    pub fn new(bucket_size: f64) -> Self {
        Self {
            bucket_size,
            buckets: HashMap::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }

    /// Bucket containing `coordinate`.
    pub fn key_for(&self, coordinate: &Coordinate) -> BucketKey {
        (
            (coordinate.lng / self.bucket_size).floor() as i64,
            (coordinate.lat / self.bucket_size).floor() as i64,
        )
    }

    pub fn insert(&mut self, coordinate: &Coordinate, item: T) {
        let key = self.key_for(coordinate);
        self.insert_at(key, item);
    }

    pub fn insert_at(&mut self, key: BucketKey, item: T) {
        self.buckets.entry(key).or_default().push(item);
        self.len += 1;
    }

    /// Items in the 3×3 block of buckets centred on `coordinate`.
    pub fn neighbourhood(&self, coordinate: &Coordinate) -> impl Iterator<Item = T> + '_ {
        let (column, row) = self.key_for(coordinate);
        self.block(column - 1..=column + 1, row - 1..=row + 1)
    }

    /// Items in the square ring at Chebyshev distance `radius` from the
    /// bucket containing `coordinate`. Ring zero is the bucket itself.
    pub fn ring(&self, coordinate: &Coordinate, radius: i64) -> Vec<T> {
        let (column, row) = self.key_for(coordinate);
        if radius == 0 {
            return self.bucket(&(column, row)).to_vec();
        }
        let mut items = Vec::new();
        for dc in -radius..=radius {
            for dr in [-radius, radius] {
                items.extend_from_slice(self.bucket(&(column + dc, row + dr)));
            }
        }
        for dr in (-radius + 1)..radius {
            for dc in [-radius, radius] {
                items.extend_from_slice(self.bucket(&(column + dc, row + dr)));
            }
        }
        items
    }

    /// Smallest distance in kilometres that any item outside ring `radius`
    /// can have from a query point inside the centre bucket.
    pub fn ring_clearance_km(&self, coordinate: &Coordinate, radius: i64) -> f64 {
        let lat_km = self.bucket_size * 111.195;
        let lng_km = lat_km * (coordinate.lat.abs() + self.bucket_size * (radius + 1) as f64)
            .min(89.9)
            .to_radians()
            .cos();
        radius as f64 * lat_km.min(lng_km)
    }

    fn bucket(&self, key: &BucketKey) -> &[T] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    fn block(
        &self,
        columns: std::ops::RangeInclusive<i64>,
        rows: std::ops::RangeInclusive<i64>,
    ) -> impl Iterator<Item = T> + '_ {
        columns
            .flat_map(move |column| rows.clone().map(move |row| (column, row)))
            .flat_map(move |key| self.bucket(&key).iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbourhood_spans_adjacent_buckets() {
        let mut grid = BucketGrid::new(0.001);
        grid.insert(&Coordinate::new(0.0005, 0.0005), 1usize);
        grid.insert(&Coordinate::new(0.0015, 0.0005), 2usize);
        grid.insert(&Coordinate::new(0.0035, 0.0005), 3usize);

        let mut found: Vec<_> = grid.neighbourhood(&Coordinate::new(0.0009, 0.0)).collect();
        found.sort_unstable();
        assert_eq!(found, vec![1, 2]);
        assert_eq!(grid.len(), 3);
    }

    #[test]
    fn rings_partition_the_plane() {
        let mut grid = BucketGrid::new(1.0);
        for x in -3..=3 {
            for y in -3..=3 {
                grid.insert(&Coordinate::new(x as f64 + 0.5, y as f64 + 0.5), (x, y));
            }
        }
        let centre = Coordinate::new(0.5, 0.5);
        let total: usize = (0..=3).map(|r| grid.ring(&centre, r).len()).sum();
        assert_eq!(total, 49);
        assert_eq!(grid.ring(&centre, 1).len(), 8);
    }
}
