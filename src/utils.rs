/// Formats a duration (in seconds) into a string HH:mm:ss
pub fn duration_to_hms<T: Into<i64>>(duration: T) -> String {
    let duration: i64 = duration.into();
    let h = duration / 3600;
    let m = (duration / 60) - (h * 60);
    let s = duration % 60;
    format!("{:.0}:{:02.0}:{:02.0}", h, m, s)
}

/// Formats a station bit mask, using the station number for open stations and `-` for closed ones
pub fn station_mask_to_string(mask: u8) -> String {
    (0..8)
        .map(|station| match mask & (1 << station) {
            0 => '-',
            _ => char::from(b'1' + station),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #[test]
    fn duration_to_hms() {
        assert_eq!(super::duration_to_hms(0u16), "0:00:00");
        assert_eq!(super::duration_to_hms(59u16), "0:00:59");
        assert_eq!(super::duration_to_hms(900u16), "0:15:00", "Testing 15 minutes");
        assert_eq!(super::duration_to_hms(21600u16), "6:00:00", "Testing longest adjusted run time");
        assert_eq!(super::duration_to_hms(u16::MAX), "18:12:15");
    }

    #[test]
    fn station_mask_to_string() {
        assert_eq!(super::station_mask_to_string(0), "--------");
        assert_eq!(super::station_mask_to_string(0b1000_0001), "1------8");
        assert_eq!(super::station_mask_to_string(0b0000_0110), "-23-----");
    }
}
