/*!
# Placement Resolver

Re-expresses a sample's placement inside another reference frame by asking
the external placement service, after rewriting the handful of deprecated
body-part targets it no longer understands.

```rust,no_run
use std::sync::Arc;

use spatial_placement::{HttpPlacementClient, PlacementConfig, PlacementResolver};
use spatial_protocol::ReferenceFrame;

# async fn demo(record: spatial_protocol::SampleRecord) -> anyhow::Result<()> {
let config = PlacementConfig::new("https://placement.example.org/get-spatial-placement");
let resolver = PlacementResolver::new(Arc::new(HttpPlacementClient::new(&config)?), &config);
let placed = resolver.resolve(&ReferenceFrame::MaleBody, &record).await?;
# let _ = placed;
# Ok(())
# }
```
*/

mod client;
mod config;
mod error;
mod legacy;
mod resolver;

pub use client::HttpPlacementClient;
pub use client::PlacementService;
pub use config::PlacementConfig;
pub use error::{PlacementError, Result};
pub use legacy::{correct_location, correct_target};
pub use resolver::PlacementResolver;
