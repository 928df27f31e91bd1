/*!
# Aquamon DevKit - Fixtures et harness pour tester le core

Bibliothèque facilitant les tests du core sans broker :
- Builders de relevés télémétrie au format du store
- Harness câblant un MemoryStore au client, à l'aggregator et au controller
- Attentes bornées par timeout sur les holders et le store
*/

pub mod fixtures;
pub mod test_utils;

pub use fixtures::{RecordBuilder, SnapshotBuilder};
pub use test_utils::TestHarness;
