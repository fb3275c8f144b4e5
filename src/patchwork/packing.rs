// This file is part of ffld, an implementation of deformable part model training with
// Fourier-accelerated convolution, following the methods described in the papers:
//
//      Exact Acceleration of Linear Object Detectors,
//      Charles Dubout, Francois Fleuret.
//      In European Conference on Computer Vision (ECCV), 2012.
//
//      Object Detection with Discriminatively Trained Part Based Models,
//      Pedro F. Felzenszwalb, Ross B. Girshick, David McAllester, Deva Ramanan.
//      In IEEE Transactions on Pattern Analysis and Machine Intelligence, 2010.
//
// You can redistribute this source code and/or modify it under the terms of the
// BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

//! Shelf packing of pyramid levels into fixed-size planes.

/// Where one level lives inside the patchwork.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Placement {
    pub plane: usize,
    pub y: usize,
    pub x: usize,
    pub rows: usize,
    pub cols: usize,
}

struct Shelf {
    plane: usize,
    y: usize,
    height: usize,
    used: usize,
}

/// Packs `(rows, cols)` rectangles, tallest first, into planes of
/// `max_rows x max_cols`. Empty rectangles get no placement. Every size must
/// fit in one plane. Returns the placements (in input order) and the number
/// of planes used.
pub(crate) fn pack(sizes: &[(usize, usize)], max_rows: usize, max_cols: usize) -> (Vec<Option<Placement>>, usize) {
    let mut order: Vec<usize> = (0..sizes.len())
        .filter(|&i| sizes[i].0 > 0 && sizes[i].1 > 0)
        .collect();
    order.sort_by(|&a, &b| sizes[b].0.cmp(&sizes[a].0).then(a.cmp(&b)));

    let mut placements = vec![None; sizes.len()];
    let mut shelves: Vec<Shelf> = Vec::new();
    // Height already claimed by shelves, per plane.
    let mut plane_heights: Vec<usize> = Vec::new();

    for i in order {
        let (rows, cols) = sizes[i];
        debug_assert!(rows <= max_rows && cols <= max_cols);

        let shelf = match shelves
            .iter()
            .position(|s| rows <= s.height && s.used + cols <= max_cols)
        {
            Some(s) => s,
            None => {
                let plane = match plane_heights.iter().position(|&h| h + rows <= max_rows) {
                    Some(plane) => plane,
                    None => {
                        plane_heights.push(0);
                        plane_heights.len() - 1
                    }
                };
                shelves.push(Shelf {
                    plane,
                    y: plane_heights[plane],
                    height: rows,
                    used: 0,
                });
                plane_heights[plane] += rows;
                shelves.len() - 1
            }
        };

        let shelf = &mut shelves[shelf];
        placements[i] = Some(Placement {
            plane: shelf.plane,
            y: shelf.y,
            x: shelf.used,
            rows,
            cols,
        });
        shelf.used += cols;
    }

    (placements, plane_heights.len())
}

#[cfg(test)]
mod tests {
    use super::{pack, Placement};

    fn overlaps(a: &Placement, b: &Placement) -> bool {
        a.plane == b.plane
            && a.x < b.x + b.cols
            && b.x < a.x + a.cols
            && a.y < b.y + b.rows
            && b.y < a.y + a.rows
    }

    #[test]
    fn test_pack_no_overlap_and_in_bounds() {
        let sizes = vec![(30, 20), (26, 17), (22, 15), (19, 13), (16, 11), (14, 10), (12, 8), (0, 5)];
        let (placements, planes) = pack(&sizes, 32, 48);
        assert!(placements[7].is_none());
        let placed: Vec<Placement> = placements.iter().flatten().cloned().collect();
        assert_eq!(7, placed.len());
        for (i, a) in placed.iter().enumerate() {
            assert!(a.plane < planes);
            assert!(a.y + a.rows <= 32 && a.x + a.cols <= 48);
            for b in &placed[i + 1..] {
                assert!(!overlaps(a, b), "{:?} overlaps {:?}", a, b);
            }
        }
        assert!(planes < 7);
    }

    #[test]
    fn test_pack_keeps_input_order() {
        let (placements, planes) = pack(&[(4, 4), (8, 8)], 8, 16);
        assert_eq!(1, planes);
        assert_eq!(Some(Placement { plane: 0, y: 0, x: 8, rows: 4, cols: 4 }), placements[0]);
        assert_eq!(Some(Placement { plane: 0, y: 0, x: 0, rows: 8, cols: 8 }), placements[1]);
    }
}
