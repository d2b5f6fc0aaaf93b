pub mod itinerary;
pub mod session;
pub mod trip;

pub use itinerary::{Activity, DayPlan, GeoPoint};
pub use session::SessionId;
pub use trip::{DataType, Item, NewTrip, TripKey, TripRecord};
