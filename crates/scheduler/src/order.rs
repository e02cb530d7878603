//! Background sweep ordering
//!
//! After the requested page is on screen the sweep renders its immediate
//! neighbours first, since those are the pages a reader flips to next, then
//! everything else front to back.

/// Pages the sweep visits after `requested`, in visiting order
///
/// `requested` is clamped into `1..=page_count` and never appears in the
/// result. Every other page appears exactly once.
pub fn sweep_order(requested: u32, page_count: u32) -> Vec<u32> {
    if page_count == 0 {
        return Vec::new();
    }
    let requested = requested.clamp(1, page_count);

    let mut order = Vec::with_capacity(page_count.saturating_sub(1) as usize);
    if requested > 1 {
        order.push(requested - 1);
    }
    if requested < page_count {
        order.push(requested + 1);
    }
    order.extend((1..=page_count).filter(|&page| page.abs_diff(requested) > 1));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_neighbours_first_then_ascending() {
        assert_eq!(sweep_order(3, 6), vec![2, 4, 1, 5, 6]);
    }

    #[test]
    fn test_first_page_has_no_previous() {
        assert_eq!(sweep_order(1, 4), vec![2, 3, 4]);
    }

    #[test]
    fn test_last_page_has_no_next() {
        assert_eq!(sweep_order(4, 4), vec![3, 1, 2]);
    }

    #[test]
    fn test_single_and_empty_documents() {
        assert!(sweep_order(1, 1).is_empty());
        assert!(sweep_order(1, 0).is_empty());
    }

    #[test]
    fn test_out_of_range_request_is_clamped() {
        assert_eq!(sweep_order(0, 3), vec![2, 3]);
        assert_eq!(sweep_order(9, 3), vec![2, 1]);
    }

    #[test]
    fn test_every_page_visited_once() {
        for count in 1..20 {
            for requested in 1..=count {
                let mut order = sweep_order(requested, count);
                order.push(requested);
                order.sort_unstable();
                assert_eq!(order, (1..=count).collect::<Vec<_>>());
            }
        }
    }
}
