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


use std::fmt;
use std::str::FromStr;

use crate::error::Error;

macro_rules! categories {
    ($($variant:ident => $name:literal,)*) => {
        /// Object categories an annotation can name.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ObjectName {
            $($variant,)*
        }

        impl ObjectName {
            pub const ALL: &'static [ObjectName] = &[$(ObjectName::$variant,)*];

            /// Name as written in annotations and on the command line.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ObjectName::$variant => $name,)*
                }
            }
        }
    };
}

categories! {
    Airplane => "airplane",
    Apple => "apple",
    Backpack => "backpack",
    Banana => "banana",
    BaseballBat => "baseball bat",
    BaseballGlove => "baseball glove",
    Bear => "bear",
    Bed => "bed",
    Bench => "bench",
    Bicycle => "bicycle",
    Bird => "bird",
    Boat => "boat",
    Book => "book",
    Bottle => "bottle",
    Bowl => "bowl",
    Broccoli => "broccoli",
    Bus => "bus",
    Cake => "cake",
    Car => "car",
    Carrot => "carrot",
    Cat => "cat",
    CellPhone => "cell phone",
    Chair => "chair",
    Clock => "clock",
    Couch => "couch",
    Cow => "cow",
    Cup => "cup",
    DiningTable => "dining table",
    Dog => "dog",
    Donut => "donut",
    Elephant => "elephant",
    FireHydrant => "fire hydrant",
    Fork => "fork",
    Frisbee => "frisbee",
    Giraffe => "giraffe",
    HairDrier => "hair drier",
    Handbag => "handbag",
    Horse => "horse",
    HotDog => "hot_dog",
    Keyboard => "keyboard",
    Kite => "kite",
    Knife => "knife",
    Laptop => "laptop",
    Microwave => "microwave",
    Motorcycle => "motorcycle",
    Mouse => "mouse",
    Orange => "orange",
    Oven => "oven",
    ParkingMeter => "parking meter",
    Person => "person",
    Pizza => "pizza",
    PottedPlant => "potted plant",
    Refrigerator => "refrigerator",
    Remote => "remote",
    Sandwich => "sandwich",
    Scissors => "scissors",
    Sheep => "sheep",
    Sink => "sink",
    Skateboard => "skateboard",
    Skis => "skis",
    Snowboard => "snowboard",
    Spoon => "spoon",
    SportsBall => "sports ball",
    StopSign => "stop sign",
    Suitcase => "suitcase",
    Surfboard => "surfboard",
    TeddyBear => "teddy bear",
    TennisRacket => "tennis racket",
    Tie => "tie",
    Toaster => "toaster",
    Toilet => "toilet",
    Toothbrush => "toothbrush",
    TrafficLight => "traffic light",
    Train => "train",
    Truck => "truck",
    Tv => "tv",
    Umbrella => "umbrella",
    Vase => "vase",
    Wine => "wine",
    Zebra => "zebra",
}

impl FromStr for ObjectName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ObjectName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownCategory(s.to_string()))
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
