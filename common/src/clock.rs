// Wrapping; 32 bits is the widest atomic the ESP32 has.
pub type Millis = u32;

/// Time from `earlier` to `now` on the wrapping clock.
///
/// A timestamp up to `skew_ms` *ahead* of `now` counts as zero elapsed: an
/// interrupt may stamp an event after the loop already read its clock.
pub fn elapsed_ms(now: Millis, earlier: Millis, skew_ms: Millis) -> Millis {
    if earlier.wrapping_sub(now) <= skew_ms {
        return 0;
    }
    now.wrapping_sub(earlier)
}
