use tokio::sync::watch;

/// Type alias to abstract a watch channel carrying the last value sent.
pub type SignalTx<T> = watch::Sender<T>;

/// Type alias to abstract a watch channel carrying the last value sent.
pub type SignalRx<T> = watch::Receiver<T>;

/// Creates a new pair of [`SignalTx`] and [`SignalRx`] starting at `initial`.
pub fn create_signal<T>(initial: T) -> (SignalTx<T>, SignalRx<T>) {
    watch::channel(initial)
}
