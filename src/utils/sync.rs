use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, WaitTimeoutResult};
use std::time::Duration;

/// Toma el lock aunque otro thread haya entrado en panic con el lock tomado.
///
/// Los estados protegidos en este crate son flags, contadores y mapas de
/// registro que siguen siendo consistentes despues de un panic de un handler.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// Espera mientras `condition` sea verdadera, como mucho `timeout`.
///
/// Devuelve el guard y `true` si se agoto el tiempo con la condicion todavia vigente.
pub fn wait_while_for<'a, T, F>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
    condition: F,
) -> (MutexGuard<'a, T>, bool)
where
    F: FnMut(&mut T) -> bool,
{
    let (guard, result): (MutexGuard<'a, T>, WaitTimeoutResult) = condvar
        .wait_timeout_while(guard, timeout, condition)
        .unwrap_or_else(PoisonError::into_inner);
    (guard, result.timed_out())
}
