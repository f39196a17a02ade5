//! Read-only interactive view over the final table.

pub mod cache;
pub mod model;
pub mod render;
pub mod server;

pub use cache::TableCache;
pub use model::{
    CountryShare, DashboardData, DashboardView, DetailTable, FilterOptions, Filters, Kpis,
    MonthlyVolume, OrderLine, ScatterPoint,
};
pub use server::{DashboardState, router, serve};
