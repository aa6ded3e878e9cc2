pub mod cyclic_polygons;
pub mod geometry;
