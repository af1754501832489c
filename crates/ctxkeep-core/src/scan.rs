//! Whole-project walks over the paged store listing.

use ctxkeep_state::{Snapshot, SnapshotStore};

use crate::domain::Result;

/// Visit every snapshot of `project`, newest first, one page at a time, and
/// return how many were visited. Only one page is held in memory.
pub(crate) async fn for_each_in_project<F>(
    store: &dyn SnapshotStore,
    project: &str,
    page_size: usize,
    mut visit: F,
) -> Result<usize>
where
    F: FnMut(&Snapshot),
{
    let page_size = page_size.max(1);
    let mut offset = 0;
    loop {
        let page = store
            .find_by_project_page(project, offset, page_size)
            .await?;
        page.iter().for_each(&mut visit);
        offset += page.len();
        if page.len() < page_size {
            return Ok(offset);
        }
    }
}
