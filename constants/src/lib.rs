/// Constants shared by the point cloud store and its tooling.
pub mod class;
pub mod coordinate_system;
pub mod format;
