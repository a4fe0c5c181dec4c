/// Outcome of offering a key to an overlay component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Key was consumed, nothing for the app to do
  Handled,
  /// Key was consumed and produced an event for the app
  Event(T),
  /// Key was not consumed
  NotHandled,
}
