/// Map over `items` in batches of `chunk_size`, yielding to the runtime
/// between batches so a large response does not starve other tasks.
///
/// Items for which `f` returns `None` are dropped.
pub async fn yielding_filter_map<T, U, F>(items: Vec<T>, chunk_size: usize, mut f: F) -> Vec<U>
where
  F: FnMut(T) -> Option<U>,
{
  let chunk_size = chunk_size.max(1);
  let mut out = Vec::with_capacity(items.len());
  let mut iter = items.into_iter().peekable();

  loop {
    out.extend(iter.by_ref().take(chunk_size).filter_map(&mut f));
    if iter.peek().is_none() {
      break;
    }
    tokio::task::yield_now().await;
  }

  out
}
